//! Configuration management using environment variables
//!
//! # Security
//!
//! - JWT_SECRET must be at least 32 characters in release builds
//! - Release builds reject weak or default secrets
//! - An unset webhook signing secret is not an error at startup, but every
//!   inbound identity-provider webhook is then rejected

use crate::error::{Error, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Default replay window for signed webhooks (seconds)
pub const DEFAULT_WEBHOOK_TOLERANCE_SECS: i64 = 300;

/// Default bound on a single gateway or persistence call (seconds)
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration
    pub database: DatabaseConfig,

    /// Server configuration
    pub server: ServerConfig,

    /// Identity-provider webhook configuration
    pub webhook: WebhookConfig,

    /// Payment gateway configuration
    pub payments: PaymentGatewayConfig,

    /// Image-processing collaborator configuration
    pub images: ImageServiceConfig,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL (takes precedence over the individual parts)
    pub url: Option<String>,

    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub name: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Connection acquire timeout in seconds (fail fast if pool exhausted)
    pub acquire_timeout_secs: u64,

    /// SSL mode for database connection
    pub ssl_mode: String,
}

impl DatabaseConfig {
    /// Build a PostgreSQL connection URL
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }

        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.ssl_mode
        )
    }
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// HS256 secret for client bearer tokens
    pub jwt_secret: String,
}

/// Identity-provider (Clerk/Svix) webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Shared signing secret, usually prefixed with `whsec_`
    pub signing_secret: Option<String>,

    /// Maximum allowed clock distance between sender and receiver
    pub tolerance_secs: i64,
}

/// Payment gateway (Razorpay) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentGatewayConfig {
    /// API key id
    pub key_id: Option<String>,

    /// API key secret
    pub key_secret: Option<String>,

    /// API base URL
    pub base_url: String,

    /// Settlement currency (ISO 4217)
    pub currency: String,

    /// Bound on gateway and persistence calls in seconds
    pub timeout_secs: u64,
}

impl PaymentGatewayConfig {
    /// Both credentials are present and non-blank
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        present(&self.key_id) && present(&self.key_secret)
    }
}

/// Image-processing collaborator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImageServiceConfig {
    /// API key for the remote image operation
    pub api_key: Option<String>,

    /// Endpoint of the remote image operation
    pub api_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let url = non_blank_var("DATABASE_URL");
        let password = match (&url, env::var("DB_PASSWORD")) {
            (_, Ok(p)) => p,
            (Some(_), Err(_)) => String::new(),
            (None, Err(_)) => {
                return Err(Error::config("DATABASE_URL or DB_PASSWORD must be set"));
            }
        };

        Ok(Self {
            database: DatabaseConfig {
                url,
                host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parse_var("DB_PORT", 5432)?,
                name: env::var("DB_NAME").unwrap_or_else(|_| "credits".to_string()),
                user: env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string()),
                password,
                max_connections: parse_var("DB_MAX_CONNECTIONS", 20)?,
                acquire_timeout_secs: parse_var("DB_ACQUIRE_TIMEOUT", 5)?,
                ssl_mode: env::var("DB_SSL_MODE").unwrap_or_else(|_| {
                    if cfg!(debug_assertions) {
                        "prefer".to_string()
                    } else {
                        "verify-full".to_string()
                    }
                }),
            },
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 8080)?,
                jwt_secret: Self::load_and_validate_jwt_secret()?,
            },
            webhook: WebhookConfig {
                signing_secret: non_blank_var("CLERK_WEBHOOK_SECRET"),
                tolerance_secs: parse_var("WEBHOOK_TOLERANCE_SECS", DEFAULT_WEBHOOK_TOLERANCE_SECS)?,
            },
            payments: PaymentGatewayConfig {
                key_id: non_blank_var("RAZORPAY_KEY_ID"),
                key_secret: non_blank_var("RAZORPAY_KEY_SECRET"),
                base_url: env::var("RAZORPAY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
                currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
                timeout_secs: positive_timeout(
                    "UPSTREAM_TIMEOUT_SECS",
                    parse_var("UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS)?,
                )?,
            },
            images: ImageServiceConfig {
                api_key: non_blank_var("CLIPDROP_API_KEY"),
                api_url: env::var("CLIPDROP_API_URL").unwrap_or_else(|_| {
                    "https://clipdrop-api.co/remove-background/v1".to_string()
                }),
            },
        })
    }

    /// Load and validate the JWT secret
    ///
    /// Release builds require JWT_SECRET, at least 32 characters, with no
    /// known default pattern. Debug builds fall back to a development value
    /// and only warn.
    fn load_and_validate_jwt_secret() -> Result<String> {
        const WEAK_PATTERNS: &[&str] = &[
            "dev_secret",
            "change_me",
            "changeme",
            "example",
            "password",
            "default",
            "your_secret",
            "jwt_secret",
        ];

        let secret = if cfg!(debug_assertions) {
            env::var("JWT_SECRET").unwrap_or_else(|_| {
                tracing::warn!(
                    "JWT_SECRET not set - using development default. \
                     DO NOT use in production!"
                );
                "dev_secret_change_in_production_32chars".to_string()
            })
        } else {
            env::var("JWT_SECRET").map_err(|_| {
                Error::config("JWT_SECRET environment variable must be set in production")
            })?
        };

        if !cfg!(debug_assertions) && secret.len() < 32 {
            return Err(Error::config(format!(
                "JWT_SECRET must be at least 32 characters. Current length: {} characters",
                secret.len()
            )));
        }

        let secret_lower = secret.to_lowercase();
        if let Some(pattern) = WEAK_PATTERNS.iter().find(|p| secret_lower.contains(*p)) {
            if cfg!(debug_assertions) {
                tracing::error!(
                    "JWT_SECRET contains weak pattern '{}'. \
                     This is acceptable in development but MUST be changed for production!",
                    pattern
                );
            } else {
                return Err(Error::config(format!(
                    "JWT_SECRET contains weak pattern '{}'. Generate with: openssl rand -base64 32",
                    pattern
                )));
            }
        }

        Ok(secret)
    }
}

/// Read an environment variable, treating blank values as unset
fn non_blank_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

/// Timeouts must be at least one second
fn positive_timeout(name: &str, secs: u64) -> Result<u64> {
    if secs == 0 {
        return Err(Error::config(format!("{} must be greater than 0", name)));
    }
    Ok(secs)
}
