//! User repository for profile records
//!
//! Profile writes never touch `credits`; balances change only through
//! [`super::credits::CreditRepository`].

use anyhow::{Context, Result};
use shared::models::{User, STARTING_CREDITS};
use shared::DbPool;

/// Profile fields written by sync and identity-provider events
#[derive(Debug, Clone, Copy)]
pub struct UpsertProfileParams<'a> {
    pub clerk_id: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub photo_url: Option<&'a str>,
}

pub struct UserRepository;

impl UserRepository {
    /// Create or update a profile
    ///
    /// New rows receive [`STARTING_CREDITS`]; existing rows keep their balance.
    pub async fn upsert_profile(pool: &DbPool, params: UpsertProfileParams<'_>) -> Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (clerk_id, email, first_name, last_name, photo_url, credits, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (clerk_id) DO UPDATE
            SET email = EXCLUDED.email,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                photo_url = EXCLUDED.photo_url,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(params.clerk_id)
        .bind(params.email)
        .bind(params.first_name)
        .bind(params.last_name)
        .bind(params.photo_url)
        .bind(STARTING_CREDITS)
        .fetch_one(pool)
        .await
        .context("Failed to upsert user profile")?;

        Ok(user)
    }

    /// Find user by identity-provider id
    pub async fn find_by_clerk_id(pool: &DbPool, clerk_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .fetch_optional(pool)
        .await
        .context("Failed to find user by clerk id")?;

        Ok(user)
    }

    /// Delete a user, returning whether a row existed
    pub async fn delete_by_clerk_id(pool: &DbPool, clerk_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM users
            WHERE clerk_id = $1
            "#,
        )
        .bind(clerk_id)
        .execute(pool)
        .await
        .context("Failed to delete user")?;

        Ok(result.rows_affected() > 0)
    }
}
