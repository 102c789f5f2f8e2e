//! Webhook handling: ingress, deduplication, reconciliation and status updates.
//!
//! ```text
//! gateway ──> WebhookIngress ──> JobQueue ──> WebhookProcessor
//!             (token, rate,                   (resolve agreement,
//!              dedup)                          derive update, apply)
//! ```

pub mod dedup;
pub mod ingress;
pub mod processor;
pub mod resolver;
pub mod update;

pub use dedup::EventDeduplicator;
pub use ingress::{IngressOutcome, WebhookIngress, ACCESS_TOKEN_HEADER};
pub use processor::{WebhookOutcome, WebhookProcessor};
pub use resolver::{external_reference_for, MatchTier, ReconciliationResolver, Resolution};
pub use update::{derive_status_update, StatusUpdate};
