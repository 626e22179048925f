//! Authentication DTOs

use serde::{Deserialize, Serialize};

/// JWT claims of a client bearer token
///
/// `sub` carries the identity provider's user id, the same key used for
/// profiles, orders and balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (clerk user id)
    pub exp: i64,    // Expiration time (as UTC timestamp)
    pub iat: i64,    // Issued at (as UTC timestamp)
}

impl Claims {
    pub fn new(clerk_id: impl Into<String>, expiration_hours: i64) -> Self {
        let now = chrono::Utc::now().timestamp();

        Self {
            sub: clerk_id.into(),
            exp: now + (expiration_hours * 3600),
            iat: now,
        }
    }
}
