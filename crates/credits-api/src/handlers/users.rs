//! User profile and balance handlers

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use shared::DbPool;
use tracing::info;

use super::helpers::{extract_user_id_or_unauthorized, forbidden, handle_db_error, validate_request};
use crate::models::{CreditsResponse, ErrorResponse, SyncProfileRequest, UserProfileResponse};
use crate::repositories::{CreditRepository, UpsertProfileParams, UserRepository};

/// Create or update the caller's profile
///
/// A caller may only sync its own profile. Balances are never taken from the
/// request; a new profile starts with the default grant.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    tag = "Users",
    request_body = SyncProfileRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Profile saved", body = UserProfileResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 403, description = "Profile belongs to another user", body = ErrorResponse)
    )
)]
pub async fn sync_profile(
    pool: web::Data<DbPool>,
    req_http: HttpRequest,
    req: web::Json<SyncProfileRequest>,
) -> impl Responder {
    let caller = match extract_user_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if caller != req.clerk_id {
        return forbidden("You don't have permission to perform this action");
    }

    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    let user = match handle_db_error(
        UserRepository::upsert_profile(
            &pool,
            UpsertProfileParams {
                clerk_id: &req.clerk_id,
                email: req.email.trim(),
                first_name: req.first_name.trim(),
                last_name: req.last_name.trim(),
                photo_url: req.photo_url.as_deref(),
            },
        )
        .await,
        "save user",
    ) {
        Ok(user) => user,
        Err(resp) => return resp,
    };

    info!(clerk_id = %user.clerk_id, "User profile saved");
    HttpResponse::Ok().json(UserProfileResponse::from(user))
}

/// Get the caller's credit balance
#[utoipa::path(
    get,
    path = "/api/v1/users/credits",
    tag = "Users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current balance", body = CreditsResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "User account not found", body = ErrorResponse)
    )
)]
pub async fn get_credits(pool: web::Data<DbPool>, req_http: HttpRequest) -> impl Responder {
    let clerk_id = match extract_user_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match handle_db_error(
        CreditRepository::get_balance(&pool, &clerk_id).await,
        "fetch credits",
    ) {
        Ok(Some(credits)) => HttpResponse::Ok().json(CreditsResponse { credits }),
        Ok(None) => HttpResponse::NotFound().json(ErrorResponse::new(
            "not_found",
            "User account not found",
        )),
        Err(resp) => resp,
    }
}
