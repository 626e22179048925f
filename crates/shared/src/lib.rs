//! Shared library for the credits backend
//!
//! This crate provides common functionality used by the service crate:
//! - Database connection pooling, migrations and health checks
//! - Row models matching the PostgreSQL schema
//! - Error handling types
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{
    Config, DatabaseConfig, ImageServiceConfig, PaymentGatewayConfig, ServerConfig, WebhookConfig,
};
pub use db::DbPool;
pub use error::{Error, Result};

/// Initialize tracing subscriber for structured logging
///
/// Set `LOG_FORMAT=json` to emit one JSON object per line (log shippers),
/// otherwise the human-readable formatter is used.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shared=debug,credits_api=debug,info".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
