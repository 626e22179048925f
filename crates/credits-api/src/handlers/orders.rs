//! Plan and order handlers
//!
//! Thin HTTP layer over [`SettlementEngine`]: identity comes from the JWT,
//! the engine owns every settlement decision.

use actix_web::{web, HttpRequest, HttpResponse, Responder};
use shared::DbPool;
use tracing::info;

use super::helpers::{
    extract_user_id_or_unauthorized, handle_db_error, settlement_error_response, validate_request,
};
use crate::models::{
    CreateOrderQuery, ErrorResponse, LimitParams, OrderResponse, PlanResponse, VerifyOrderRequest,
};
use crate::repositories::OrderRepository;
use crate::services::{SettlementEngine, SettlementResult};

/// List purchasable plans
#[utoipa::path(
    get,
    path = "/api/v1/plans",
    tag = "Orders",
    responses(
        (status = 200, description = "Plan catalog", body = Vec<PlanResponse>)
    )
)]
pub async fn list_plans(engine: web::Data<SettlementEngine>) -> impl Responder {
    let plans: Vec<PlanResponse> = engine
        .catalog()
        .plans()
        .iter()
        .map(|plan| PlanResponse::new(plan, engine.currency()))
        .collect();

    HttpResponse::Ok().json(plans)
}

/// Create an order for a plan
///
/// Creates the remote order at the payment gateway and records it locally.
/// The returned `order_id` is used for checkout and later verification.
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    tag = "Orders",
    params(CreateOrderQuery),
    security(("bearer_auth" = [])),
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Unknown plan", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 502, description = "Payment gateway error", body = ErrorResponse),
        (status = 503, description = "Temporarily unavailable, retry later", body = ErrorResponse)
    )
)]
pub async fn create_order(
    engine: web::Data<SettlementEngine>,
    req_http: HttpRequest,
    query: web::Query<CreateOrderQuery>,
) -> impl Responder {
    let clerk_id = match extract_user_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match engine.create_order(&query.plan_id, &clerk_id).await {
        Ok(order) => HttpResponse::Created().json(OrderResponse::from(order)),
        Err(e) => settlement_error_response(&e),
    }
}

/// Verify payment of an order and settle it
///
/// Safe to call repeatedly: credits are granted at most once per order.
/// `settled` is true only for the call that granted them.
#[utoipa::path(
    post,
    path = "/api/v1/orders/verify",
    tag = "Orders",
    request_body = VerifyOrderRequest,
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Verification outcome", body = SettlementResult),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse),
        (status = 404, description = "Order not found at gateway", body = ErrorResponse),
        (status = 503, description = "Temporarily unavailable, retry later", body = ErrorResponse)
    )
)]
pub async fn verify_order(
    engine: web::Data<SettlementEngine>,
    req_http: HttpRequest,
    req: web::Json<VerifyOrderRequest>,
) -> impl Responder {
    let clerk_id = match extract_user_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(resp) = validate_request(&*req) {
        return resp;
    }

    match engine.verify_and_settle(&req.razorpay_order_id).await {
        Ok(result) => {
            info!(
                clerk_id = %clerk_id,
                order_id = %req.razorpay_order_id,
                settled = result.settled,
                "Order verification completed"
            );
            HttpResponse::Ok().json(result)
        }
        Err(e) => settlement_error_response(&e),
    }
}

/// List the caller's most recent orders
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    tag = "Orders",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum items to return (1-100, default 20)")
    ),
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Orders, newest first", body = Vec<OrderResponse>),
        (status = 400, description = "Invalid limit", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn list_orders(
    pool: web::Data<DbPool>,
    req_http: HttpRequest,
    query: web::Query<LimitParams>,
) -> impl Responder {
    let clerk_id = match extract_user_id_or_unauthorized(&req_http) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if let Err(msg) = query.validate() {
        return HttpResponse::BadRequest().json(ErrorResponse::new("validation_error", msg));
    }

    let orders = match handle_db_error(
        OrderRepository::list_for_buyer(&pool, &clerk_id, query.limit).await,
        "list orders",
    ) {
        Ok(orders) => orders,
        Err(resp) => return resp,
    };

    let response: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    HttpResponse::Ok().json(response)
}
