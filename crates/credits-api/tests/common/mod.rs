//! Common test utilities for integration tests
//!
//! In-memory stand-ins for the payment gateway and the settlement store, plus
//! JWT and engine builders. The store serializes settlement through a single
//! async mutex, the same guarantee the PostgreSQL row lock provides.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use credits_api::models::Claims;
use credits_api::services::{
    CreateRemoteOrder, GatewayError, NewOrder, PaymentGateway, PlanCatalog, RemoteOrder,
    SettleOutcome, SettlementEngine, SettlementStore, StoreError,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use shared::models::Order;
use tokio::sync::Mutex;

pub const TEST_JWT_SECRET: &str = "test_jwt_secret_for_integration_tests";
pub const TEST_CURRENCY: &str = "INR";

/// Bearer token for `clerk_id` signed with [`TEST_JWT_SECRET`]
pub fn bearer(clerk_id: &str) -> String {
    let token = encode(
        &Header::default(),
        &Claims::new(clerk_id, 1),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to encode test token");
    format!("Bearer {}", token)
}

#[derive(Default)]
struct StoreState {
    orders: HashMap<String, Order>,
    balances: HashMap<String, i32>,
    next_id: i64,
}

/// Settlement store backed by process memory
#[derive(Default)]
pub struct InMemorySettlementStore {
    state: Mutex<StoreState>,
}

impl InMemorySettlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, clerk_id: &str, credits: i32) {
        self.state
            .lock()
            .await
            .balances
            .insert(clerk_id.to_string(), credits);
    }

    pub async fn balance(&self, clerk_id: &str) -> Option<i32> {
        self.state.lock().await.balances.get(clerk_id).copied()
    }

    pub async fn order(&self, reference: &str) -> Option<Order> {
        self.state.lock().await.orders.get(reference).cloned()
    }

    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl SettlementStore for InMemorySettlementStore {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.order_id) {
            return Err(StoreError::DuplicateReference(order.order_id));
        }

        state.next_id += 1;
        let row = Order {
            id: state.next_id,
            order_id: order.order_id.clone(),
            clerk_id: order.clerk_id,
            plan: order.plan,
            credits: order.credits,
            amount_minor: order.amount_minor,
            currency: order.currency,
            payment: false,
            created_at: Utc::now(),
            settled_at: None,
        };
        state.orders.insert(order.order_id, row.clone());
        Ok(row)
    }

    async fn settle_order(&self, reference: &str) -> Result<SettleOutcome, StoreError> {
        let mut state = self.state.lock().await;

        let (clerk_id, credits) = match state.orders.get(reference) {
            None => return Ok(SettleOutcome::MissingOrder),
            Some(order) if order.payment => return Ok(SettleOutcome::AlreadyProcessed),
            Some(order) => (order.clerk_id.clone(), order.credits),
        };

        // Give concurrent callers a chance to run while the lock is held
        tokio::task::yield_now().await;

        let balance = state.balances.entry(clerk_id).or_insert(0);
        *balance += credits;
        let new_balance = *balance;

        if let Some(order) = state.orders.get_mut(reference) {
            order.payment = true;
            order.settled_at = Some(Utc::now());
        }

        Ok(SettleOutcome::Settled {
            credits_added: credits,
            new_balance,
        })
    }
}

/// Payment gateway whose order statuses are set by the test
#[derive(Default)]
pub struct ScriptedGateway {
    orders: StdMutex<HashMap<String, RemoteOrder>>,
    next_reference: StdMutex<Option<String>>,
    created: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that sleeps before answering every call
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Reference to hand out for the next created order
    pub fn issue_next(&self, reference: &str) {
        *self.next_reference.lock().unwrap() = Some(reference.to_string());
    }

    pub fn set_status(&self, reference: &str, status: &str) {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .entry(reference.to_string())
            .or_insert_with(|| remote_order(reference, 0, "created"));
        order.status = status.to_string();
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_order(&self, request: &CreateRemoteOrder) -> Result<RemoteOrder, GatewayError> {
        self.pause().await;
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = self
            .next_reference
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| format!("order_test{}", n));

        let order = remote_order(&reference, request.amount_minor, "created");
        self.orders
            .lock()
            .unwrap()
            .insert(reference, order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, reference: &str) -> Result<RemoteOrder, GatewayError> {
        self.pause().await;
        self.orders
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or(GatewayError::NotFound)
    }
}

fn remote_order(reference: &str, amount: i64, status: &str) -> RemoteOrder {
    RemoteOrder {
        id: reference.to_string(),
        amount,
        currency: TEST_CURRENCY.to_string(),
        status: status.to_string(),
        receipt: None,
        amount_paid: None,
        created_at: None,
    }
}

/// Engine over the given fakes with the standard plan catalog
pub fn engine(
    gateway: Arc<ScriptedGateway>,
    store: Arc<InMemorySettlementStore>,
    call_timeout: Duration,
) -> SettlementEngine {
    SettlementEngine::new(
        gateway,
        store,
        Arc::new(PlanCatalog::standard()),
        TEST_CURRENCY,
        call_timeout,
    )
}
