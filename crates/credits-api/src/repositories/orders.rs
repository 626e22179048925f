//! Order repository and the PostgreSQL settlement store

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::models::Order;
use shared::DbPool;
use sqlx::{Executor, PgConnection, Postgres};

use super::credits::{CreditRepository, LedgerError};
use crate::services::settlement::{NewOrder, SettleOutcome, SettlementStore, StoreError};

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";
/// serialization_failure and deadlock_detected: safe to retry the transaction
const RETRYABLE_STATES: &[&str] = &["40001", "40P01"];

pub struct OrderRepository;

impl OrderRepository {
    /// Insert an unsettled order
    pub async fn create<'e, E>(executor: E, order: &NewOrder) -> Result<Order>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (order_id, clerk_id, plan, credits, amount_minor, currency, payment, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, NOW())
            RETURNING *
            "#,
        )
        .bind(&order.order_id)
        .bind(&order.clerk_id)
        .bind(&order.plan)
        .bind(order.credits)
        .bind(order.amount_minor)
        .bind(&order.currency)
        .fetch_one(executor)
        .await
        .context("Failed to create order")?;

        Ok(order)
    }

    /// Find an order by its gateway reference
    pub async fn find_by_reference(pool: &DbPool, reference: &str) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(reference)
        .fetch_optional(pool)
        .await
        .context("Failed to find order")?;

        Ok(order)
    }

    /// Most recent orders of one buyer
    pub async fn list_for_buyer(pool: &DbPool, clerk_id: &str, limit: i64) -> Result<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE clerk_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(clerk_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to list orders")?;

        Ok(orders)
    }

    /// Read an order and lock its row until the transaction ends
    pub async fn lock_by_reference(
        conn: &mut PgConnection,
        reference: &str,
    ) -> Result<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE order_id = $1
            FOR UPDATE
            "#,
        )
        .bind(reference)
        .fetch_optional(conn)
        .await
        .context("Failed to lock order")?;

        Ok(order)
    }

    /// Set the settlement flag if it is still clear
    ///
    /// Returns false when another transaction already set it.
    pub async fn mark_settled<'e, E>(executor: E, reference: &str) -> Result<bool>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET payment = TRUE, settled_at = NOW()
            WHERE order_id = $1 AND payment = FALSE
            "#,
        )
        .bind(reference)
        .execute(executor)
        .await
        .context("Failed to mark order settled")?;

        Ok(result.rows_affected() == 1)
    }
}

/// [`SettlementStore`] backed by PostgreSQL
///
/// Settlement runs in one transaction: lock the order row, check the flag,
/// credit the buyer, flip the flag with a compare-and-set, commit. Any early
/// return drops the transaction, which rolls it back.
#[derive(Clone)]
pub struct PgSettlementStore {
    pool: DbPool,
}

impl PgSettlementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementStore for PgSettlementStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        OrderRepository::create(&self.pool, &order)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::DuplicateReference(order.order_id.clone())
                } else {
                    store_error(e)
                }
            })
    }

    async fn settle_order(&self, reference: &str) -> Result<SettleOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(classify_sqlx)?;

        let Some(order) = OrderRepository::lock_by_reference(&mut *tx, reference)
            .await
            .map_err(store_error)?
        else {
            return Ok(SettleOutcome::MissingOrder);
        };

        if order.is_settled() {
            return Ok(SettleOutcome::AlreadyProcessed);
        }

        let new_balance = CreditRepository::adjust_balance(&mut tx, &order.clerk_id, order.credits)
            .await
            .map_err(|e| match e {
                LedgerError::Database(db) => classify_sqlx(db),
                other => StoreError::Internal(other.to_string()),
            })?;

        let flipped = OrderRepository::mark_settled(&mut *tx, reference)
            .await
            .map_err(store_error)?;
        if !flipped {
            // Row lock makes this unreachable; the rollback discards the credit
            tracing::warn!(order_id = %reference, "Settlement flag changed under row lock");
            return Ok(SettleOutcome::AlreadyProcessed);
        }

        tx.commit().await.map_err(classify_sqlx)?;

        Ok(SettleOutcome::Settled {
            credits_added: order.credits,
            new_balance,
        })
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION)
}

/// Map a repository error, keeping transient database failures retryable
fn store_error(err: anyhow::Error) -> StoreError {
    match err.downcast::<sqlx::Error>() {
        Ok(db) => classify_sqlx(db),
        Err(other) => StoreError::Internal(format!("{:#}", other)),
    }
}

fn classify_sqlx(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StoreError::Unavailable(err.to_string()),
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| RETRYABLE_STATES.iter().any(|s| code == *s)) =>
        {
            StoreError::Unavailable(err.to_string())
        }
        _ => StoreError::Internal(err.to_string()),
    }
}
