//! Credit ledger
//!
//! Balances live on the `users` row. Every change goes through
//! [`CreditRepository::adjust_balance`], which only accepts an open
//! transaction so the caller decides what else commits with it.

use anyhow::{Context, Result};
use shared::DbPool;
use sqlx::{Postgres, Transaction};
use thiserror::Error;

/// Errors from balance adjustments
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient credits: balance {balance}, requested {requested}")]
    InsufficientCredits { balance: i32, requested: i32 },

    #[error("Credit balance overflow")]
    Overflow,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub struct CreditRepository;

impl CreditRepository {
    /// Current balance, `None` if the account does not exist
    pub async fn get_balance(pool: &DbPool, clerk_id: &str) -> Result<Option<i32>> {
        let balance = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT credits FROM users
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .fetch_optional(pool)
        .await
        .context("Failed to get credit balance")?;

        Ok(balance)
    }

    /// Add `delta` (may be negative) to an account and return the new balance
    ///
    /// Creates the account with a zero balance if it does not exist yet, then
    /// locks the row for the rest of the transaction. Rejects any change that
    /// would take the balance below zero.
    pub async fn adjust_balance(
        tx: &mut Transaction<'_, Postgres>,
        clerk_id: &str,
        delta: i32,
    ) -> Result<i32, LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO users (clerk_id, credits, created_at, updated_at)
            VALUES ($1, 0, NOW(), NOW())
            ON CONFLICT (clerk_id) DO NOTHING
            "#,
        )
        .bind(clerk_id)
        .execute(&mut **tx)
        .await?;

        // Lock the row until commit so concurrent adjustments serialize
        let current = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT credits FROM users
            WHERE clerk_id = $1
            FOR UPDATE
            "#,
        )
        .bind(clerk_id)
        .fetch_one(&mut **tx)
        .await?;

        let new_balance = current.checked_add(delta).ok_or(LedgerError::Overflow)?;
        if new_balance < 0 {
            return Err(LedgerError::InsufficientCredits {
                balance: current,
                requested: delta.saturating_neg(),
            });
        }

        sqlx::query(
            r#"
            UPDATE users
            SET credits = $2, updated_at = NOW()
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .bind(new_balance)
        .execute(&mut **tx)
        .await?;

        tracing::debug!(clerk_id = %clerk_id, delta, new_balance, "Credit balance adjusted");

        Ok(new_balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    async fn pool() -> DbPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .unwrap();
        shared::db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_adjust_balance_creates_account() {
        let pool = pool().await;
        let clerk_id = format!("user_ledger_{}", uuid::Uuid::new_v4().simple());

        let mut tx = pool.begin().await.unwrap();
        let balance = CreditRepository::adjust_balance(&mut tx, &clerk_id, 100)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(balance, 100);
        assert_eq!(
            CreditRepository::get_balance(&pool, &clerk_id).await.unwrap(),
            Some(100)
        );
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_adjust_balance_rejects_overdraw() {
        let pool = pool().await;
        let clerk_id = format!("user_ledger_{}", uuid::Uuid::new_v4().simple());

        let mut tx = pool.begin().await.unwrap();
        CreditRepository::adjust_balance(&mut tx, &clerk_id, 1)
            .await
            .unwrap();
        let err = CreditRepository::adjust_balance(&mut tx, &clerk_id, -2)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientCredits {
                balance: 1,
                requested: 2
            }
        ));
    }

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL
    async fn test_rolled_back_adjustment_leaves_no_trace() {
        let pool = pool().await;
        let clerk_id = format!("user_ledger_{}", uuid::Uuid::new_v4().simple());

        {
            let mut tx = pool.begin().await.unwrap();
            CreditRepository::adjust_balance(&mut tx, &clerk_id, 50)
                .await
                .unwrap();
            // dropped without commit
        }

        assert_eq!(
            CreditRepository::get_balance(&pool, &clerk_id).await.unwrap(),
            None
        );
    }
}
