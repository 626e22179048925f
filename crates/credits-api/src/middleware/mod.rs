//! Middleware for the credits API

pub mod auth;
pub mod metrics;

pub use auth::{get_user_id, AuthError, JwtAuth};
pub use metrics::{init_metrics, metrics_handler, RequestMetrics};

use actix_cors::Cors;
use actix_web::http;
use std::env;

/// Configure CORS middleware
///
/// Debug builds allow localhost origins. Release builds allow only the
/// comma-separated `ALLOWED_ORIGINS` whitelist and deny everything when it
/// is empty.
pub fn cors() -> Cors {
    let origins = parse_origins(&env::var("ALLOWED_ORIGINS").unwrap_or_default());

    if !cfg!(debug_assertions) && origins.is_empty() {
        tracing::warn!("ALLOWED_ORIGINS not set. Denying all CORS requests in production.");
    }

    Cors::default()
        .allowed_origin_fn(move |origin, _req_head| {
            let origin_str = origin.to_str().unwrap_or("");

            if cfg!(debug_assertions) {
                origin_str.starts_with("http://localhost")
                    || origin_str.starts_with("http://127.0.0.1")
            } else {
                origins.iter().any(|allowed| origin_str == allowed)
            }
        })
        .allowed_methods(vec!["GET", "POST"])
        .allowed_headers(vec![
            http::header::AUTHORIZATION,
            http::header::ACCEPT,
            http::header::CONTENT_TYPE,
        ])
        .max_age(3600)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins("https://app.example.com, https://admin.example.com,,"),
            vec!["https://app.example.com", "https://admin.example.com"]
        );
        assert!(parse_origins("").is_empty());
    }
}
