//! Image operation handler
//!
//! Spends one credit per successful background removal. The balance is
//! checked before the remote call and debited after it, in its own
//! transaction through the ledger, so a failed remote call costs nothing.

use actix_web::{http::header, web, HttpRequest, HttpResponse, Responder};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::DbPool;
use tracing::{error, info, warn};

use super::helpers::{
    bad_request, extract_user_id_or_unauthorized, handle_db_error, service_unavailable,
};
use crate::models::{ErrorResponse, RemoveBackgroundResponse};
use crate::repositories::{CreditRepository, LedgerError};
use crate::services::{ImageProcessor, ImageServiceError};

/// Largest accepted upload
pub const MAX_IMAGE_BYTES: usize = 30 * 1024 * 1024;

/// Credits spent per processed image
const IMAGE_COST: i32 = 1;

const ALLOWED_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/jpg", "image/png", "image/webp"];

/// Remove the background of an image
#[utoipa::path(
    post,
    path = "/api/v1/images/remove-background",
    tag = "Images",
    request_body(content = Vec<u8>, description = "Raw image bytes", content_type = "image/png"),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Processed image", body = RemoveBackgroundResponse),
        (status = 400, description = "Empty body or unsupported content type", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 402, description = "Insufficient credits", body = ErrorResponse),
        (status = 413, description = "Image too large"),
        (status = 503, description = "Image service unavailable", body = ErrorResponse)
    )
)]
pub async fn remove_background(
    pool: web::Data<DbPool>,
    processor: web::Data<dyn ImageProcessor>,
    req_http: HttpRequest,
    body: web::Bytes,
) -> impl Responder {
    let clerk_id = match extract_user_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let content_type = match allowed_content_type(&req_http) {
        Some(ct) => ct,
        None => {
            return bad_request(
                "invalid_file",
                "Invalid file type. Please upload JPEG, PNG, or WebP images only",
            )
        }
    };

    if body.is_empty() {
        return bad_request("invalid_file", "Please select an image file");
    }

    let balance = match handle_db_error(
        CreditRepository::get_balance(&pool, &clerk_id).await,
        "fetch credits",
    ) {
        Ok(balance) => balance.unwrap_or(0),
        Err(resp) => return resp,
    };

    if balance < IMAGE_COST {
        warn!(clerk_id = %clerk_id, balance, "Insufficient credits for image operation");
        return insufficient_credits(balance);
    }

    let processed = match processor.remove_background(body.to_vec(), &content_type).await {
        Ok(bytes) => bytes,
        Err(e @ ImageServiceError::InvalidImage) => {
            warn!(clerk_id = %clerk_id, "Image rejected by processing service");
            return bad_request("invalid_file", &e.to_string());
        }
        Err(e) => {
            error!(clerk_id = %clerk_id, error = ?e, "Image processing failed");
            return service_unavailable("image_service_error", &e.to_string());
        }
    };

    let remaining = match debit(&pool, &clerk_id).await {
        Ok(remaining) => remaining,
        Err(LedgerError::InsufficientCredits { balance, .. }) => {
            warn!(clerk_id = %clerk_id, balance, "Balance spent concurrently, result withheld");
            return insufficient_credits(balance);
        }
        Err(e) => {
            error!(clerk_id = %clerk_id, error = %e, "Failed to debit credit");
            return HttpResponse::InternalServerError().json(ErrorResponse::new(
                "internal_error",
                "Failed to process image. Please try again later",
            ));
        }
    };

    info!(clerk_id = %clerk_id, remaining_credits = remaining, "Image processed");
    HttpResponse::Ok().json(RemoveBackgroundResponse {
        image_base64: STANDARD.encode(processed),
        remaining_credits: remaining,
    })
}

async fn debit(pool: &DbPool, clerk_id: &str) -> Result<i32, LedgerError> {
    let mut tx = pool.begin().await?;
    let remaining = CreditRepository::adjust_balance(&mut tx, clerk_id, -IMAGE_COST).await?;
    tx.commit().await?;
    Ok(remaining)
}

fn insufficient_credits(balance: i32) -> HttpResponse {
    HttpResponse::PaymentRequired().json(ErrorResponse::with_details(
        "insufficient_credits",
        "Insufficient credits to process image",
        serde_json::json!({ "credit_balance": balance }),
    ))
}

/// Normalized content type if it is an accepted image type
fn allowed_content_type(req: &HttpRequest) -> Option<String> {
    let raw = req.headers().get(header::CONTENT_TYPE)?.to_str().ok()?;
    let essence = raw.split(';').next()?.trim().to_ascii_lowercase();
    ALLOWED_CONTENT_TYPES
        .contains(&essence.as_str())
        .then_some(essence)
}
