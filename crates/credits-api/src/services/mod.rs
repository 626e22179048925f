//! Business logic services for the credits API
//!
//! Signature verification, the plan catalog, the payment gateway adapter,
//! the settlement engine and the image processor client. Services are kept
//! separate from HTTP handlers and database access; the gateway, store and
//! image processor are trait seams so tests can substitute them.

pub mod image_processor;
pub mod payment_gateway;
pub mod plans;
pub mod settlement;
pub mod signature;

pub use image_processor::{ClipdropClient, ImageProcessor, ImageServiceError};
pub use payment_gateway::{
    CreateRemoteOrder, GatewayError, PaymentGateway, RazorpayGateway, RemoteOrder,
};
pub use plans::{format_minor_units, Plan, PlanCatalog};
pub use settlement::{
    NewOrder, SettleOutcome, SettlementEngine, SettlementError, SettlementResult,
    SettlementStatus, SettlementStore, StoreError, ALREADY_PROCESSED_MESSAGE, NOT_PAID_MESSAGE,
};
pub use signature::{VerificationFailure, WebhookVerifier};
