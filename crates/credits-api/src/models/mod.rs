//! Data Transfer Objects (DTOs) for API requests and responses

pub mod auth;
pub mod common;
pub mod orders;
pub mod users;
pub mod webhooks;

// Re-exports
pub use auth::*;
pub use common::*;
pub use orders::*;
pub use users::*;
pub use webhooks::*;
