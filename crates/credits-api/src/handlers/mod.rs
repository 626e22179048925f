//! Request handlers for API endpoints

pub mod health;
pub mod helpers;
pub mod images;
pub mod orders;
pub mod users;
pub mod webhooks;

// Re-export commonly used handlers
pub use health::*;
pub use images::*;
pub use orders::*;
pub use users::*;
pub use webhooks::*;
