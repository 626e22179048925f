//! Identity-provider webhook handler
//!
//! Clerk user lifecycle events delivered through Svix. The raw body is
//! authenticated with [`WebhookVerifier`] before it is parsed.
//!
//! # Responses
//!
//! - 400 `missing_header`: a Svix header is absent or blank
//! - 401 `invalid_signature`: verification failed (bad signature, stale
//!   timestamp, or no secret configured)
//! - 400 `invalid_payload` / `unsupported_event`: authenticated but unusable
//! - 200 `{ "received": true, "event_type": ... }`: processed

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use shared::DbPool;
use tracing::{info, warn};

use super::helpers::{bad_request, handle_db_error};
use crate::models::{ErrorResponse, EventParseError, IdentityEvent, ProfileData, WebhookAck};
use crate::repositories::{UpsertProfileParams, UserRepository};
use crate::services::WebhookVerifier;

pub const SVIX_ID_HEADER: &str = "svix-id";
pub const SVIX_TIMESTAMP_HEADER: &str = "svix-timestamp";
pub const SVIX_SIGNATURE_HEADER: &str = "svix-signature";

/// Handle a Clerk webhook
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/clerk",
    tag = "Webhooks",
    params(
        ("svix-id" = String, Header, description = "Event id"),
        ("svix-timestamp" = String, Header, description = "Send time, seconds since epoch"),
        ("svix-signature" = String, Header, description = "Space-separated v1,<base64> signatures")
    ),
    request_body(content = String, description = "Raw event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed", body = WebhookAck),
        (status = 400, description = "Missing header, invalid payload or unsupported event", body = ErrorResponse),
        (status = 401, description = "Signature verification failed", body = ErrorResponse),
        (status = 500, description = "Profile store error", body = ErrorResponse)
    )
)]
pub async fn handle_clerk_webhook(
    pool: web::Data<DbPool>,
    verifier: web::Data<WebhookVerifier>,
    req_http: HttpRequest,
    payload: web::Bytes,
) -> impl Responder {
    let (event_id, timestamp, signature) = match svix_headers(&req_http) {
        Ok(headers) => headers,
        Err(missing) => {
            warn!(header = missing, "Webhook rejected: missing header");
            return bad_request("missing_header", &format!("Missing {} header", missing));
        }
    };

    if !verifier.verify(event_id, timestamp, signature, &payload) {
        return HttpResponse::Unauthorized().json(ErrorResponse::new(
            "invalid_signature",
            "Invalid webhook signature",
        ));
    }

    let event = match IdentityEvent::parse(&payload) {
        Ok(event) => event,
        Err(EventParseError::Unsupported(event_type)) => {
            warn!(event_id = %event_id, event_type = %event_type, "Unsupported webhook event type");
            return bad_request("unsupported_event", "Unsupported event type");
        }
        Err(e) => {
            warn!(event_id = %event_id, error = %e, "Invalid webhook payload");
            return bad_request("invalid_payload", &e.to_string());
        }
    };

    info!(
        event_id = %event_id,
        event_type = event.event_type(),
        clerk_id = %event.clerk_id(),
        "Processing webhook event"
    );

    let result = match &event {
        IdentityEvent::Created(profile) | IdentityEvent::Updated(profile) => {
            upsert(&pool, profile).await
        }
        IdentityEvent::Deleted { clerk_id } => delete(&pool, clerk_id).await,
    };

    match handle_db_error(result, "process user event") {
        Ok(()) => HttpResponse::Ok().json(WebhookAck::new(event.event_type())),
        Err(resp) => resp,
    }
}

/// Extract the three Svix headers, naming the first missing one
fn svix_headers(req: &HttpRequest) -> Result<(&str, &str, &str), &'static str> {
    let get = move |name: &'static str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .ok_or(name)
    };

    Ok((
        get(SVIX_ID_HEADER)?,
        get(SVIX_TIMESTAMP_HEADER)?,
        get(SVIX_SIGNATURE_HEADER)?,
    ))
}

async fn upsert(pool: &DbPool, profile: &ProfileData) -> anyhow::Result<()> {
    let user = UserRepository::upsert_profile(
        pool,
        UpsertProfileParams {
            clerk_id: &profile.clerk_id,
            email: &profile.email,
            first_name: &profile.first_name,
            last_name: &profile.last_name,
            photo_url: profile.photo_url.as_deref(),
        },
    )
    .await?;

    info!(clerk_id = %user.clerk_id, credits = user.credits, "User profile synced from webhook");
    Ok(())
}

async fn delete(pool: &DbPool, clerk_id: &str) -> anyhow::Result<()> {
    if UserRepository::delete_by_clerk_id(pool, clerk_id).await? {
        info!(clerk_id = %clerk_id, "User deleted");
    } else {
        info!(clerk_id = %clerk_id, "User already absent, nothing to delete");
    }
    Ok(())
}
