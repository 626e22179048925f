//! Settlement Engine
//!
//! Turns plan purchases into credits.
//!
//! # Flow
//!
//! 1. `create_order`: resolve the plan, create a remote order at the payment
//!    gateway, record a local order with the settlement flag cleared
//! 2. `verify_and_settle`: ask the gateway for the order's status and, when
//!    paid, credit the buyer and set the flag in one atomic store operation
//!
//! # Guarantees
//!
//! - An order's credits are granted at most once, however many times
//!   verification is requested and however many requests run concurrently.
//!   The store owns this guarantee; the engine only interprets the outcome.
//! - The gateway is never contacted for an unknown plan or a blank buyer
//! - Every gateway and store call is bounded by a timeout; expiry surfaces as
//!   [`SettlementError::Transient`] so callers can retry safely
//!
//! # Decision tree for `verify_and_settle`
//!
//! ```text
//! reference malformed?        -> InvalidReference
//! gateway: different order?   -> PaymentGateway
//! gateway: order unknown?     -> OrderNotFound
//! gateway: status != paid?    -> settled=false ("payment not completed")
//! store: no local order?      -> LocalOrderMissing (logged as an invariant violation)
//! store: flag already set?    -> settled=false ("already processed")
//! otherwise                   -> credit balance, set flag, settled=true
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use shared::models::Order;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::payment_gateway::{CreateRemoteOrder, GatewayError, PaymentGateway};
use super::plans::PlanCatalog;

/// Message returned when verification finds the order already settled
pub const ALREADY_PROCESSED_MESSAGE: &str = "already processed";

/// Message returned when the gateway does not report the order as paid
pub const NOT_PAID_MESSAGE: &str = "Payment not completed. Please try again or contact support";

/// Local order to be recorded after the remote order exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_id: String,
    pub clerk_id: String,
    pub plan: String,
    pub credits: i32,
    pub amount_minor: i64,
    pub currency: String,
}

/// Result of one atomic settlement attempt in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Credits granted and flag set in this attempt
    Settled { credits_added: i32, new_balance: i32 },
    /// Flag was already set; nothing changed
    AlreadyProcessed,
    /// No local order carries this reference
    MissingOrder,
}

/// Errors raised by a settlement store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection, pool or serialization failure; the operation may be retried
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Duplicate order reference: {0}")]
    DuplicateReference(String),

    #[error("Store error: {0}")]
    Internal(String),
}

/// Persistence seam for orders and credit balances
///
/// `settle_order` must be atomic: read the order, check the flag, add the
/// plan's credits to the buyer and set the flag either all happen or none do,
/// and two concurrent calls for the same reference must not both observe the
/// flag unset.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn settle_order(&self, reference: &str) -> Result<SettleOutcome, StoreError>;
}

/// Outcome kind reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SettlementStatus {
    Settled,
    NotPaid,
    AlreadyProcessed,
}

/// Result of a verification request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SettlementResult {
    /// True only when this request granted the credits
    pub settled: bool,
    pub status: SettlementStatus,
    pub message: String,
    pub credits_added: i32,
    /// Buyer's balance after crediting; present only when settled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance: Option<i32>,
}

impl SettlementResult {
    fn settled(credits_added: i32, new_balance: i32) -> Self {
        Self {
            settled: true,
            status: SettlementStatus::Settled,
            message: format!(
                "Payment successful! {} credits added to your account",
                credits_added
            ),
            credits_added,
            new_balance: Some(new_balance),
        }
    }

    fn not_paid() -> Self {
        Self {
            settled: false,
            status: SettlementStatus::NotPaid,
            message: NOT_PAID_MESSAGE.to_string(),
            credits_added: 0,
            new_balance: None,
        }
    }

    fn already_processed() -> Self {
        Self {
            settled: false,
            status: SettlementStatus::AlreadyProcessed,
            message: ALREADY_PROCESSED_MESSAGE.to_string(),
            credits_added: 0,
            new_balance: None,
        }
    }
}

/// Errors surfaced by the settlement engine
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Buyer identity is required")]
    InvalidBuyer,

    #[error("Order reference is required")]
    InvalidReference,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Gateway reports a paid order that has no local record
    #[error("Paid order {0} has no local record")]
    LocalOrderMissing(String),

    #[error("Payment gateway error: {0}")]
    PaymentGateway(String),

    /// Timeout or temporary unavailability; safe to retry
    #[error("Temporarily unavailable: {0}")]
    Transient(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl SettlementError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<GatewayError> for SettlementError {
    fn from(err: GatewayError) -> Self {
        if err.is_transient() {
            Self::Transient(err.to_string())
        } else {
            Self::PaymentGateway(err.to_string())
        }
    }
}

impl From<StoreError> for SettlementError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Self::Transient(msg),
            other => Self::Persistence(other.to_string()),
        }
    }
}

/// Coordinates the plan catalog, the payment gateway and the store
pub struct SettlementEngine {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn SettlementStore>,
    catalog: Arc<PlanCatalog>,
    currency: String,
    call_timeout: Duration,
}

impl SettlementEngine {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn SettlementStore>,
        catalog: Arc<PlanCatalog>,
        currency: impl Into<String>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            store,
            catalog,
            currency: currency.into(),
            call_timeout,
        }
    }

    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Create a remote order for a plan and record it locally
    ///
    /// The buyer's balance is not touched. Plan ids are matched exactly
    /// after trimming surrounding whitespace.
    pub async fn create_order(
        &self,
        plan_id: &str,
        buyer_key: &str,
    ) -> Result<Order, SettlementError> {
        let plan_id = plan_id.trim();
        if plan_id.is_empty() {
            return Err(SettlementError::InvalidPlan(
                "Plan ID cannot be empty".to_string(),
            ));
        }
        let plan = self
            .catalog
            .lookup(plan_id)
            .ok_or_else(|| SettlementError::InvalidPlan(plan_id.to_string()))?;

        let buyer_key = buyer_key.trim();
        if buyer_key.is_empty() {
            return Err(SettlementError::InvalidBuyer);
        }

        let request = CreateRemoteOrder {
            amount_minor: plan.amount_minor,
            currency: self.currency.clone(),
            receipt: format!("rcpt_{}", Uuid::new_v4().simple()),
        };

        let remote = self
            .bounded("gateway create_order", self.gateway.create_order(&request))
            .await??;

        if remote.id.trim().is_empty() {
            return Err(SettlementError::PaymentGateway(
                "Gateway returned an empty order reference".to_string(),
            ));
        }

        let order = self
            .bounded(
                "store insert_order",
                self.store.insert_order(NewOrder {
                    order_id: remote.id,
                    clerk_id: buyer_key.to_string(),
                    plan: plan.id.clone(),
                    credits: plan.credits,
                    amount_minor: plan.amount_minor,
                    currency: self.currency.clone(),
                }),
            )
            .await??;

        metrics::counter!("orders_created_total", "plan" => plan.id.clone()).increment(1);
        info!(
            order_id = %order.order_id,
            clerk_id = %order.clerk_id,
            plan = %order.plan,
            credits = order.credits,
            amount_minor = order.amount_minor,
            "Order created"
        );

        Ok(order)
    }

    /// Confirm payment with the gateway and settle the order at most once
    pub async fn verify_and_settle(
        &self,
        reference: &str,
    ) -> Result<SettlementResult, SettlementError> {
        let reference = reference.trim();
        if !is_valid_reference(reference) {
            return Err(SettlementError::InvalidReference);
        }

        let remote = match self
            .bounded("gateway fetch_order", self.gateway.fetch_order(reference))
            .await?
        {
            Ok(remote) => remote,
            Err(GatewayError::NotFound) => {
                return Err(SettlementError::OrderNotFound(reference.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        if remote.id != reference {
            warn!(
                order_id = %reference,
                gateway_order_id = %remote.id,
                "Gateway returned a different order than requested"
            );
            record_outcome("reference_mismatch");
            return Err(SettlementError::PaymentGateway(
                "Gateway returned a different order".to_string(),
            ));
        }

        if !remote.is_paid() {
            debug!(
                order_id = %reference,
                gateway_status = %remote.status,
                "Order not paid yet"
            );
            record_outcome("not_paid");
            return Ok(SettlementResult::not_paid());
        }

        let outcome = self
            .bounded("store settle_order", self.store.settle_order(reference))
            .await??;

        match outcome {
            SettleOutcome::Settled {
                credits_added,
                new_balance,
            } => {
                record_outcome("settled");
                info!(
                    order_id = %reference,
                    credits_added,
                    new_balance,
                    "Order settled"
                );
                Ok(SettlementResult::settled(credits_added, new_balance))
            }
            SettleOutcome::AlreadyProcessed => {
                record_outcome("already_processed");
                debug!(order_id = %reference, "Order already settled");
                Ok(SettlementResult::already_processed())
            }
            SettleOutcome::MissingOrder => {
                record_outcome("local_order_missing");
                error!(
                    error_id = "SETTLEMENT_ORDER_MISSING",
                    order_id = %reference,
                    "Gateway reports order paid but no local order exists"
                );
                Err(SettlementError::LocalOrderMissing(reference.to_string()))
            }
        }
    }

    /// Run one upstream call under the configured timeout
    ///
    /// A dropped store future rolls back its open transaction, so an expired
    /// settlement either committed fully or not at all.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, SettlementError>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| {
                warn!(
                    operation,
                    timeout_ms = self.call_timeout.as_millis() as u64,
                    "Upstream call timed out"
                );
                SettlementError::Transient(format!("{} timed out", operation))
            })
    }
}

/// Gateway order ids are ASCII letters, digits and underscores
fn is_valid_reference(reference: &str) -> bool {
    !reference.is_empty()
        && reference
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("settlement_outcomes_total", "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::payment_gateway::RemoteOrder;
    use chrono::Utc;
    use mockall::mock;

    mock! {
        pub Gateway {}

        #[async_trait]
        impl PaymentGateway for Gateway {
            async fn create_order(&self, request: &CreateRemoteOrder) -> Result<RemoteOrder, GatewayError>;
            async fn fetch_order(&self, reference: &str) -> Result<RemoteOrder, GatewayError>;
        }
    }

    mock! {
        pub Store {}

        #[async_trait]
        impl SettlementStore for Store {
            async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError>;
            async fn settle_order(&self, reference: &str) -> Result<SettleOutcome, StoreError>;
        }
    }

    fn remote(id: &str, status: &str, amount: i64) -> RemoteOrder {
        RemoteOrder {
            id: id.to_string(),
            amount,
            currency: "INR".to_string(),
            status: status.to_string(),
            receipt: None,
            amount_paid: None,
            created_at: None,
        }
    }

    fn stored(order: NewOrder) -> Order {
        Order {
            id: 1,
            order_id: order.order_id,
            clerk_id: order.clerk_id,
            plan: order.plan,
            credits: order.credits,
            amount_minor: order.amount_minor,
            currency: order.currency,
            payment: false,
            created_at: Utc::now(),
            settled_at: None,
        }
    }

    fn engine(gateway: MockGateway, store: MockStore) -> SettlementEngine {
        SettlementEngine::new(
            Arc::new(gateway),
            Arc::new(store),
            Arc::new(PlanCatalog::standard()),
            "INR",
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_create_order_records_plan_terms() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_order()
            .withf(|req| {
                req.amount_minor == 49_900 && req.currency == "INR" && req.receipt.starts_with("rcpt_")
            })
            .times(1)
            .returning(|req| Ok(remote("order_abc", "created", req.amount_minor)));

        let mut store = MockStore::new();
        store
            .expect_insert_order()
            .withf(|o| {
                o.order_id == "order_abc"
                    && o.clerk_id == "user_1"
                    && o.plan == "Basic"
                    && o.credits == 100
                    && o.amount_minor == 49_900
            })
            .times(1)
            .returning(|o| Ok(stored(o)));

        let order = engine(gateway, store)
            .create_order("Basic", "user_1")
            .await
            .unwrap();

        assert_eq!(order.order_id, "order_abc");
        assert!(!order.is_settled());
    }

    #[tokio::test]
    async fn test_create_order_unknown_plan_never_contacts_gateway() {
        let mut gateway = MockGateway::new();
        gateway.expect_create_order().never();
        let mut store = MockStore::new();
        store.expect_insert_order().never();

        let engine = engine(gateway, store);
        for plan in ["Gold", "basic", "", "   "] {
            assert!(matches!(
                engine.create_order(plan, "user_1").await,
                Err(SettlementError::InvalidPlan(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_create_order_blank_buyer_rejected() {
        let mut gateway = MockGateway::new();
        gateway.expect_create_order().never();

        let result = engine(gateway, MockStore::new())
            .create_order("Premium", "  ")
            .await;
        assert_eq!(result.unwrap_err(), SettlementError::InvalidBuyer);
    }

    #[tokio::test]
    async fn test_create_order_empty_remote_id_not_recorded() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_order()
            .returning(|req| Ok(remote("", "created", req.amount_minor)));
        let mut store = MockStore::new();
        store.expect_insert_order().never();

        let result = engine(gateway, store).create_order("Basic", "user_1").await;
        assert!(matches!(result, Err(SettlementError::PaymentGateway(_))));
    }

    #[tokio::test]
    async fn test_create_order_gateway_outage_is_transient() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_create_order()
            .returning(|_| Err(GatewayError::Unavailable("503".to_string())));

        let err = engine(gateway, MockStore::new())
            .create_order("Basic", "user_1")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_verify_paid_order_settles() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_order()
            .withf(|r| r == "order_abc")
            .returning(|r| Ok(remote(r, "PAID", 49_900)));
        let mut store = MockStore::new();
        store.expect_settle_order().times(1).returning(|_| {
            Ok(SettleOutcome::Settled {
                credits_added: 100,
                new_balance: 105,
            })
        });

        let result = engine(gateway, store)
            .verify_and_settle("order_abc")
            .await
            .unwrap();

        assert!(result.settled);
        assert_eq!(result.status, SettlementStatus::Settled);
        assert_eq!(result.credits_added, 100);
        assert_eq!(result.new_balance, Some(105));
        assert_eq!(
            result.message,
            "Payment successful! 100 credits added to your account"
        );
    }

    #[tokio::test]
    async fn test_verify_unpaid_order_leaves_store_untouched() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_order()
            .returning(|r| Ok(remote(r, "created", 49_900)));
        let mut store = MockStore::new();
        store.expect_settle_order().never();

        let result = engine(gateway, store)
            .verify_and_settle("order_abc")
            .await
            .unwrap();

        assert!(!result.settled);
        assert_eq!(result.status, SettlementStatus::NotPaid);
        assert_eq!(result.credits_added, 0);
        assert_eq!(result.new_balance, None);
    }

    #[tokio::test]
    async fn test_verify_already_processed() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_order()
            .returning(|r| Ok(remote(r, "paid", 49_900)));
        let mut store = MockStore::new();
        store
            .expect_settle_order()
            .returning(|_| Ok(SettleOutcome::AlreadyProcessed));

        let result = engine(gateway, store)
            .verify_and_settle("order_abc")
            .await
            .unwrap();

        assert!(!result.settled);
        assert_eq!(result.message, ALREADY_PROCESSED_MESSAGE);
        assert_eq!(result.credits_added, 0);
    }

    #[tokio::test]
    async fn test_verify_paid_without_local_order_is_invariant_violation() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_order()
            .returning(|r| Ok(remote(r, "paid", 49_900)));
        let mut store = MockStore::new();
        store
            .expect_settle_order()
            .returning(|_| Ok(SettleOutcome::MissingOrder));

        let err = engine(gateway, store)
            .verify_and_settle("order_ghost")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SettlementError::LocalOrderMissing("order_ghost".to_string())
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_verify_unknown_remote_order() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_order()
            .returning(|_| Err(GatewayError::NotFound));
        let mut store = MockStore::new();
        store.expect_settle_order().never();

        let err = engine(gateway, store)
            .verify_and_settle("order_missing")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SettlementError::OrderNotFound("order_missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_verify_blank_reference() {
        let mut gateway = MockGateway::new();
        gateway.expect_fetch_order().never();

        let err = engine(gateway, MockStore::new())
            .verify_and_settle(" ")
            .await
            .unwrap_err();
        assert_eq!(err, SettlementError::InvalidReference);
    }

    #[tokio::test]
    async fn test_verify_malformed_reference_never_reaches_gateway() {
        let mut gateway = MockGateway::new();
        gateway.expect_fetch_order().never();
        let mut store = MockStore::new();
        store.expect_settle_order().never();

        let engine = engine(gateway, store);
        for reference in ["order_abc?x=1", "order_abc/../x", "order_abc#x", "order abc", "ordér"] {
            assert_eq!(
                engine.verify_and_settle(reference).await.unwrap_err(),
                SettlementError::InvalidReference,
                "{}",
                reference
            );
        }
    }

    #[tokio::test]
    async fn test_verify_gateway_returning_other_order_is_rejected() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_order()
            .returning(|_| Ok(remote("order_other", "paid", 49_900)));
        let mut store = MockStore::new();
        store.expect_settle_order().never();

        let err = engine(gateway, store)
            .verify_and_settle("order_abc")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::PaymentGateway(_)));
    }

    #[test]
    fn test_reference_format() {
        assert!(is_valid_reference("order_IluGWxBm9U8zJ8"));
        assert!(!is_valid_reference(""));
        assert!(!is_valid_reference("order_abc?x=1"));
        assert!(!is_valid_reference("order/abc"));
    }

    #[tokio::test]
    async fn test_store_unavailable_is_retryable() {
        let mut gateway = MockGateway::new();
        gateway
            .expect_fetch_order()
            .returning(|r| Ok(remote(r, "paid", 49_900)));
        let mut store = MockStore::new();
        store
            .expect_settle_order()
            .returning(|_| Err(StoreError::Unavailable("pool timed out".to_string())));

        let err = engine(gateway, store)
            .verify_and_settle("order_abc")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    struct SlowGateway;

    #[async_trait]
    impl PaymentGateway for SlowGateway {
        async fn create_order(
            &self,
            _request: &CreateRemoteOrder,
        ) -> Result<RemoteOrder, GatewayError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(GatewayError::Timeout)
        }

        async fn fetch_order(&self, reference: &str) -> Result<RemoteOrder, GatewayError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(remote(reference, "paid", 49_900))
        }
    }

    #[tokio::test]
    async fn test_gateway_timeout_is_transient_and_skips_store() {
        let mut store = MockStore::new();
        store.expect_settle_order().never();

        let engine = SettlementEngine::new(
            Arc::new(SlowGateway),
            Arc::new(store),
            Arc::new(PlanCatalog::standard()),
            "INR",
            Duration::from_millis(20),
        );

        let err = engine.verify_and_settle("order_abc").await.unwrap_err();
        assert!(matches!(err, SettlementError::Transient(_)));
    }

    #[test]
    fn test_error_conversions() {
        assert!(SettlementError::from(GatewayError::Timeout).is_retryable());
        assert!(!SettlementError::from(GatewayError::Rejected("bad".into())).is_retryable());
        assert!(SettlementError::from(StoreError::Unavailable("io".into())).is_retryable());
        assert!(matches!(
            SettlementError::from(StoreError::Internal("constraint".into())),
            SettlementError::Persistence(_)
        ));
    }

    #[test]
    fn test_result_serialization() {
        let json = serde_json::to_value(SettlementResult::already_processed()).unwrap();
        assert_eq!(json["settled"], false);
        assert_eq!(json["status"], "already_processed");
        assert!(json.get("new_balance").is_none());

        let json = serde_json::to_value(SettlementResult::settled(250, 255)).unwrap();
        assert_eq!(json["new_balance"], 255);
    }
}
