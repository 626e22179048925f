//! Credits API
//!
//! REST API server for credit plans, payment settlement, identity-provider
//! webhooks and credit-metered image processing.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use shared::{db, Config};
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

use credits_api::middleware::{self, RequestMetrics};
use credits_api::repositories::PgSettlementStore;
use credits_api::routes;
use credits_api::services::{
    ClipdropClient, ImageProcessor, PlanCatalog, RazorpayGateway, SettlementEngine,
    WebhookVerifier,
};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    shared::init_tracing();

    tracing::info!("Starting Credits API...");

    middleware::init_metrics().context("Failed to install Prometheus recorder")?;

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Create database connection pool
    let db_pool = db::create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;

    // Run database migrations
    db::run_migrations(&db_pool)
        .await
        .context("Failed to run database migrations")?;

    // Check database health
    db::check_health(&db_pool)
        .await
        .context("Database health check failed")?;

    let verifier = web::Data::new(WebhookVerifier::from_config(&config.webhook));
    if !verifier.is_configured() {
        tracing::warn!("CLERK_WEBHOOK_SECRET not set - all identity webhooks will be rejected");
    }

    let gateway =
        RazorpayGateway::new(&config.payments).context("Failed to create payment gateway client")?;
    let engine = web::Data::new(SettlementEngine::new(
        Arc::new(gateway),
        Arc::new(PgSettlementStore::new(db_pool.clone())),
        Arc::new(PlanCatalog::standard()),
        config.payments.currency.clone(),
        Duration::from_secs(config.payments.timeout_secs),
    ));

    let processor: Arc<dyn ImageProcessor> = Arc::new(
        ClipdropClient::new(&config.images).context("Failed to create image service client")?,
    );
    let processor = web::Data::from(processor);

    let jwt_secret = config.server.jwt_secret.clone();
    let server_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Credits API listening on {}", server_addr);

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(RequestMetrics)
            .wrap(middleware::cors())
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(verifier.clone())
            .app_data(engine.clone())
            .app_data(processor.clone())
            .configure(|cfg| routes::configure(cfg, &jwt_secret))
    })
    .bind(&server_addr)
    .with_context(|| format!("Failed to bind to {}", server_addr))?
    .run()
    .await
    .context("Server error")?;

    Ok(())
}
