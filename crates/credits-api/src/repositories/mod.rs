//! Repository layer for database access

pub mod credits;
pub mod orders;
pub mod users;

// Re-exports
pub use credits::{CreditRepository, LedgerError};
pub use orders::{OrderRepository, PgSettlementStore};
pub use users::{UpsertProfileParams, UserRepository};
