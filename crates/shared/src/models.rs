//! Data models matching the PostgreSQL database schema

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Credits granted to an account created through profile sync
pub const STARTING_CREDITS: i32 = 5;

/// User account keyed by the identity provider's user id
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub clerk_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub photo_url: Option<String>,
    pub credits: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchase intent for one plan
///
/// `payment` is the settlement flag: it moves from `false` to `true` once,
/// in the same transaction that credits the buyer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    /// Remote order reference issued by the payment gateway
    pub order_id: String,
    /// Buyer's external identity key
    pub clerk_id: String,
    pub plan: String,
    pub credits: i32,
    /// Amount in minor currency units (paise for INR)
    pub amount_minor: i64,
    pub currency: String,
    pub payment: bool,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Whether the order has already been converted into credits
    pub fn is_settled(&self) -> bool {
        self.payment
    }
}
