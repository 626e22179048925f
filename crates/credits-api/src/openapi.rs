//! OpenAPI Documentation Configuration
//!
//! Generated with utoipa from the handler annotations and DTO schemas.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::handlers;
use crate::handlers::health::HealthResponse;
use crate::models;
use crate::services::{SettlementResult, SettlementStatus};

/// OpenAPI documentation for the credits API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Credits API",
        version = "1.0.0",
        description = "Prepaid credits for image processing.\n\n## Authentication\n\nClient endpoints require `Authorization: Bearer <token>`. The token subject is the identity provider's user id.\n\nThe identity-provider webhook is authenticated by its Svix signature instead.\n\n## Settlement\n\n`POST /api/v1/orders/verify` may be retried freely. Credits for an order are granted at most once; only the call that granted them reports `settled: true`."
    ),
    servers(
        (url = "http://localhost:8080", description = "Development server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Orders", description = "Plans, order creation and payment settlement"),
        (name = "Users", description = "Profiles and credit balances"),
        (name = "Images", description = "Credit-metered image operations"),
        (name = "Webhooks", description = "Identity-provider lifecycle events")
    ),
    modifiers(&SecurityAddon),
    paths(
        // Health
        handlers::health_check,
        handlers::openapi_json,
        // Orders
        handlers::list_plans,
        handlers::create_order,
        handlers::verify_order,
        handlers::list_orders,
        // Users
        handlers::sync_profile,
        handlers::get_credits,
        // Images
        handlers::remove_background,
        // Webhooks
        handlers::handle_clerk_webhook,
    ),
    components(
        schemas(
            HealthResponse,
            models::ErrorResponse,
            models::PlanResponse,
            models::VerifyOrderRequest,
            models::OrderResponse,
            models::SyncProfileRequest,
            models::UserProfileResponse,
            models::CreditsResponse,
            models::RemoveBackgroundResponse,
            models::WebhookAck,
            SettlementResult,
            SettlementStatus,
        )
    )
)]
pub struct ApiDoc;

/// Security scheme modifier for bearer authentication
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Session token issued by the identity provider"))
                    .build(),
            ),
        );
    }
}
