//! Plan and order DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::models::Order;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::services::plans::{format_minor_units, Plan};

/// One entry of the plan catalog
#[derive(Debug, Serialize, ToSchema)]
pub struct PlanResponse {
    pub id: String,
    pub credits: i32,
    /// Price in minor currency units
    pub amount_minor: i64,
    /// Price in major units, e.g. "499.00"
    pub amount: String,
    pub currency: String,
}

impl PlanResponse {
    pub fn new(plan: &Plan, currency: &str) -> Self {
        Self {
            id: plan.id.clone(),
            credits: plan.credits,
            amount_minor: plan.amount_minor,
            amount: plan.display_amount(),
            currency: currency.to_string(),
        }
    }
}

/// Query string of the order creation endpoint
#[derive(Debug, Deserialize, IntoParams)]
pub struct CreateOrderQuery {
    /// Plan identifier (case-sensitive)
    #[serde(rename = "planId", alias = "plan_id")]
    #[param(rename = "planId")]
    pub plan_id: String,
}

/// Request body of the verification endpoint
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyOrderRequest {
    /// Remote order reference returned at creation
    #[validate(length(min = 1, max = 255))]
    pub razorpay_order_id: String,
}

/// Local order as returned to clients
#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    /// Remote order reference, used for checkout and verification
    pub order_id: String,
    pub plan: String,
    pub credits: i32,
    pub amount_minor: i64,
    pub amount: String,
    pub currency: String,
    /// Whether the order has been settled
    pub payment: bool,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            amount: format_minor_units(order.amount_minor),
            order_id: order.order_id,
            plan: order.plan,
            credits: order.credits,
            amount_minor: order.amount_minor,
            currency: order.currency,
            payment: order.payment,
            created_at: order.created_at,
            settled_at: order.settled_at,
        }
    }
}
