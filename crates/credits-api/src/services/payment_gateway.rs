//! Payment Gateway
//!
//! Seam over the external payment provider plus the Razorpay implementation.
//!
//! # Provider contract
//!
//! - `POST {base}/orders` creates a remote order for an amount in minor units
//! - `GET {base}/orders/{id}` reports the order's current status
//! - Both calls use HTTP basic auth with the key id and key secret
//!
//! An order is paid when its status equals "paid" (case-insensitive). Any
//! other status means payment is still pending or failed.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use shared::PaymentGatewayConfig;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Status reported by the provider once the payment was captured
const PAID_STATUS: &str = "paid";

/// Errors returned by a payment gateway
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Payment gateway credentials are not configured")]
    NotConfigured,

    #[error("Order not found at payment gateway")]
    NotFound,

    #[error("Payment gateway request timed out")]
    Timeout,

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Payment gateway rejected request: {0}")]
    Rejected(String),

    #[error("Invalid payment gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    /// Whether the same request may succeed if retried later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::Unavailable(_))
    }
}

/// Parameters for a new remote order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRemoteOrder {
    /// Amount in minor currency units
    pub amount_minor: i64,
    pub currency: String,
    /// Merchant-side receipt identifier
    pub receipt: String,
}

/// Remote order as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub amount_paid: Option<i64>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl RemoteOrder {
    pub fn is_paid(&self) -> bool {
        self.status.eq_ignore_ascii_case(PAID_STATUS)
    }
}

/// External payment provider
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a remote order and return the provider's record of it
    async fn create_order(&self, request: &CreateRemoteOrder) -> Result<RemoteOrder, GatewayError>;

    /// Fetch the current state of a remote order
    async fn fetch_order(&self, reference: &str) -> Result<RemoteOrder, GatewayError>;
}

/// Razorpay Orders API client
#[derive(Clone)]
pub struct RazorpayGateway {
    http_client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

/// Error envelope returned by the Razorpay API
#[derive(Debug, Deserialize)]
struct RazorpayErrorBody {
    error: RazorpayErrorDetail,
}

#[derive(Debug, Deserialize)]
struct RazorpayErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RazorpayGateway {
    /// Build a client from configuration
    ///
    /// Missing credentials are not an error here: every call then fails with
    /// [`GatewayError::NotConfigured`].
    pub fn new(config: &PaymentGatewayConfig) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("HTTP client: {}", e)))?;

        let credentials = if config.is_configured() {
            config.key_id.clone().zip(config.key_secret.clone())
        } else {
            warn!("Razorpay credentials not set - order creation and verification will fail");
            None
        };

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    fn credentials(&self) -> Result<(&str, &str), GatewayError> {
        self.credentials
            .as_ref()
            .map(|(id, secret)| (id.as_str(), secret.as_str()))
            .ok_or(GatewayError::NotConfigured)
    }

    /// `{base_url}/orders/{reference}` with the reference as one encoded path segment
    fn order_url(&self, reference: &str) -> Result<Url, GatewayError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| GatewayError::Unavailable(format!("Invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::Unavailable("Base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .push("orders")
            .push(reference);
        Ok(url)
    }

    async fn read_order(response: reqwest::Response) -> Result<RemoteOrder, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<RemoteOrder>()
                .await
                .map_err(|e| GatewayError::InvalidResponse(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, request: &CreateRemoteOrder) -> Result<RemoteOrder, GatewayError> {
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected("Invalid amount specified".to_string()));
        }
        let (key_id, key_secret) = self.credentials()?;

        debug!(
            amount_minor = request.amount_minor,
            currency = %request.currency,
            receipt = %request.receipt,
            "Creating Razorpay order"
        );

        let response = self
            .http_client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(key_id, Some(key_secret))
            .json(&serde_json::json!({
                "amount": request.amount_minor,
                "currency": request.currency,
                "receipt": request.receipt,
                "payment_capture": 1,
            }))
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_order(response).await
    }

    async fn fetch_order(&self, reference: &str) -> Result<RemoteOrder, GatewayError> {
        let (key_id, key_secret) = self.credentials()?;

        let response = self
            .http_client
            .get(self.order_url(reference)?)
            .basic_auth(key_id, Some(key_secret))
            .send()
            .await
            .map_err(transport_error)?;

        Self::read_order(response).await
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(e.to_string())
    }
}

/// Map a non-success provider response to a gateway error
///
/// Razorpay answers unknown order ids with 400 BAD_REQUEST_ERROR and a
/// "does not exist" description rather than 404.
fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let detail = serde_json::from_str::<RazorpayErrorBody>(body).ok();
    let description = detail
        .as_ref()
        .and_then(|d| d.error.description.clone())
        .unwrap_or_else(|| format!("HTTP {}", status));

    if status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST && description.contains("does not exist"))
    {
        return GatewayError::NotFound;
    }

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return GatewayError::Unavailable(description);
    }

    if status == StatusCode::UNAUTHORIZED {
        warn!("Razorpay rejected API credentials");
    }

    let code = detail.and_then(|d| d.error.code);
    match code {
        Some(code) => GatewayError::Rejected(format!("{}: {}", code, description)),
        None => GatewayError::Rejected(description),
    }
}
