//! Providers module - payment gateways (Asaas, test-mode simulator)
//!
//! This module defines the `PaymentProvider` trait and the canonical payment
//! vocabulary. Each gateway implements the trait; vendor statuses and events
//! are mapped onto the canonical enums by [`normalize`].
//!
//! # Example
//!
//! ```rust,ignore
//! use paygate::providers::{create_provider, PaymentProvider};
//!
//! async fn example(settings: &paygate::config::ProviderSettings) {
//!     let resolved = create_provider(settings, std::sync::Arc::new(paygate::utils::SystemClock)).unwrap();
//!     let payment = resolved.provider.get_payment("pay_123").await.unwrap();
//!     println!("{} is {}", payment.id, payment.status);
//! }
//! ```

pub mod asaas;
pub mod custom;
pub mod factory;
pub mod normalize;
pub mod simulator;
mod types;

pub use asaas::AsaasAdapter;
pub use custom::CustomGateway;
pub use factory::{create_provider, ResolvedProvider};
pub use normalize::{map_event, map_status, parse_webhook_body};
pub use simulator::TestModeSimulator;
pub use types::{
    BillingType, CreateCustomerParams, CreatePaymentParams, PaymentProvider, PaymentSnapshot,
    PaymentStatus, ProviderCustomer, ProviderPayment, RefundParams, WebhookEvent,
    WebhookEventType,
};
