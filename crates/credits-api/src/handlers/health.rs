//! Health check and service endpoints

use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use shared::DbPool;
use utoipa::{OpenApi, ToSchema};

use crate::openapi::ApiDoc;

/// Health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub version: String,
}

impl HealthResponse {
    fn new(database_up: bool) -> Self {
        let (status, database) = if database_up {
            ("healthy", "connected")
        } else {
            ("unhealthy", "disconnected")
        };
        Self {
            status: status.to_string(),
            database: database.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    )
)]
pub async fn health_check(pool: web::Data<DbPool>) -> impl Responder {
    match shared::db::check_health(&pool).await {
        Ok(()) => HttpResponse::Ok().json(HealthResponse::new(true)),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(HealthResponse::new(false))
        }
    }
}

/// OpenAPI JSON endpoint
#[utoipa::path(
    get,
    path = "/api/v1/openapi.json",
    tag = "Health",
    responses(
        (status = 200, description = "OpenAPI specification", content_type = "application/json")
    )
)]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().content_type("application/json").body(
        ApiDoc::openapi()
            .to_json()
            .unwrap_or_else(|_| "{}".to_string()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_states() {
        let up = HealthResponse::new(true);
        assert_eq!(up.status, "healthy");
        assert_eq!(up.database, "connected");

        let down = serde_json::to_value(HealthResponse::new(false)).unwrap();
        assert_eq!(down["status"], "unhealthy");
        assert_eq!(down["database"], "disconnected");
    }

    #[actix_web::test]
    async fn test_openapi_json_lists_settlement_routes() {
        let resp = openapi_json().await;
        let req = actix_web::test::TestRequest::default().to_http_request();
        let body = actix_web::body::to_bytes(resp.respond_to(&req).into_body())
            .await
            .ok()
            .expect("openapi body readable");
        let doc: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(doc["paths"]["/api/v1/orders/verify"].is_object());
        assert!(doc["paths"]["/api/v1/webhooks/clerk"].is_object());
    }
}
