//! Paygate - payment-gateway abstraction and webhook reconciliation core
//!
//! Normalizes gateway statuses and events, reconciles webhooks to agreements,
//! runs slow gateway calls on a durable job queue and enforces field
//! encryption, PCI log redaction and per-tenant rate limits.

pub mod app;
pub mod config;
pub mod error;
pub mod payments;
pub mod providers;
pub mod queue;
pub mod security;
pub mod store;
pub mod utils;
pub mod webhook;

pub use app::{Paygate, PaygateBuilder};
pub use config::Config;
pub use error::{GatewayError, PaygateError, Result};
pub use payments::{PaymentService, TransactionLog, TransactionLogSink};
pub use providers::{
    map_event, map_status, PaymentProvider, PaymentStatus, ProviderPayment, WebhookEvent,
    WebhookEventType,
};
pub use queue::{Job, JobHandle, JobOperation, JobQueue, JobStatus, WorkerPool};
pub use store::{Agreement, AgreementStatus, AgreementStore, Notifier};
pub use webhook::{IngressOutcome, MatchTier, WebhookIngress, WebhookOutcome, WebhookProcessor};
