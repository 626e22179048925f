//! Common Handler Helpers
//!
//! Reusable pieces for consistent error bodies across handlers.
//!
//! - [`extract_user_id_or_unauthorized`] - identity from JWT claims or 401
//! - [`validate_request`] - `validator` check or 400
//! - [`handle_db_error`] - log and convert repository errors to 500
//! - [`settlement_error_response`] - map engine errors to status codes

use actix_web::{http::header, HttpRequest, HttpResponse};
use validator::Validate;

use crate::middleware::get_user_id;
use crate::models::ErrorResponse;
use crate::services::SettlementError;

/// Seconds a client should wait before retrying a transient failure
pub const RETRY_AFTER_SECS: u64 = 5;

/// Extract the caller's identity key or return 401 Unauthorized
///
/// ```ignore
/// let clerk_id = match extract_user_id_or_unauthorized(&req_http) {
///     Ok(id) => id,
///     Err(resp) => return resp,
/// };
/// ```
pub fn extract_user_id_or_unauthorized(req: &HttpRequest) -> Result<String, HttpResponse> {
    get_user_id(req).map_err(|_| unauthorized("Authentication required"))
}

/// Validate a request struct or return 400 Bad Request
pub fn validate_request<T: Validate>(req: &T) -> Result<(), HttpResponse> {
    req.validate().map_err(|e| {
        HttpResponse::BadRequest().json(ErrorResponse::new(
            "validation_error",
            format!("Validation failed: {}", e),
        ))
    })
}

/// Convert a repository error into 500 with logging
///
/// The error detail is logged, never returned to the client.
pub fn handle_db_error<T, E: std::fmt::Display>(
    result: Result<T, E>,
    context: &str,
) -> Result<T, HttpResponse> {
    result.map_err(|e| {
        tracing::error!("Database error during {}: {}", context, e);
        HttpResponse::InternalServerError().json(ErrorResponse::new(
            "internal_error",
            format!("Failed to {}", context),
        ))
    })
}

pub fn bad_request(error: &str, message: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorResponse::new(error, message))
}

pub fn unauthorized(message: &str) -> HttpResponse {
    HttpResponse::Unauthorized().json(ErrorResponse::new("unauthorized", message))
}

pub fn forbidden(message: &str) -> HttpResponse {
    HttpResponse::Forbidden().json(ErrorResponse::new("forbidden", message))
}

/// 503 with a `Retry-After` hint
pub fn service_unavailable(error: &str, message: &str) -> HttpResponse {
    HttpResponse::ServiceUnavailable()
        .insert_header((header::RETRY_AFTER, RETRY_AFTER_SECS.to_string()))
        .json(ErrorResponse::new(error, message))
}

/// Map a settlement engine error to an HTTP response
pub fn settlement_error_response(err: &SettlementError) -> HttpResponse {
    match err {
        SettlementError::InvalidPlan(_) => bad_request("invalid_plan", &err.to_string()),
        SettlementError::InvalidBuyer => bad_request("invalid_buyer", &err.to_string()),
        SettlementError::InvalidReference => bad_request("invalid_reference", &err.to_string()),
        SettlementError::OrderNotFound(_) => HttpResponse::NotFound()
            .json(ErrorResponse::new("order_not_found", err.to_string())),
        SettlementError::Transient(_) => service_unavailable(
            "temporarily_unavailable",
            "Payment service temporarily unavailable. Please retry",
        ),
        SettlementError::PaymentGateway(detail) => {
            tracing::error!(error = %detail, "Payment gateway error");
            HttpResponse::BadGateway().json(ErrorResponse::new(
                "payment_gateway_error",
                "Payment service error. Please try again later",
            ))
        }
        SettlementError::LocalOrderMissing(_) | SettlementError::Persistence(_) => {
            tracing::error!(error = %err, "Settlement failed");
            HttpResponse::InternalServerError().json(ErrorResponse::new(
                "internal_error",
                "An internal error occurred. Please contact support",
            ))
        }
    }
}
