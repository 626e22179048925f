//! Route configuration for the API

use actix_web::web;

use crate::{handlers, middleware};

/// Configure all routes
pub fn configure(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    cfg.route("/metrics", web::get().to(middleware::metrics_handler));

    cfg.service(
        web::scope("/api/v1")
            // Health check endpoint (no auth required)
            .route("/health", web::get().to(handlers::health_check))
            .route("/openapi.json", web::get().to(handlers::openapi_json))
            .route("/plans", web::get().to(handlers::list_plans))
            // Identity-provider webhook (no auth - uses signature verification)
            .route(
                "/webhooks/clerk",
                web::post().to(handlers::handle_clerk_webhook),
            )
            // Protected routes (JWT auth)
            .service(
                web::scope("")
                    .wrap(middleware::JwtAuth::new(jwt_secret))
                    .service(
                        web::scope("/orders")
                            .route("", web::post().to(handlers::create_order))
                            .route("", web::get().to(handlers::list_orders))
                            .route("/verify", web::post().to(handlers::verify_order)),
                    )
                    .service(
                        web::scope("/users")
                            .route("", web::post().to(handlers::sync_profile))
                            .route("/credits", web::get().to(handlers::get_credits)),
                    )
                    .service(
                        web::resource("/images/remove-background")
                            .app_data(web::PayloadConfig::new(handlers::MAX_IMAGE_BYTES))
                            .route(web::post().to(handlers::remove_background)),
                    ),
            ),
    );
}
