//! Provider types for Paygate
//!
//! Canonical payment vocabulary shared by every gateway adapter, plus the
//! `PaymentProvider` trait the adapters implement.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PaygateError, Result};

// ============================================================================
// Canonical enums
// ============================================================================

/// Canonical payment status. Vendor statuses are mapped onto this by
/// [`crate::providers::normalize::map_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Received,
    Overdue,
    Refunded,
    Cancelled,
    Deleted,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 7] = [
        PaymentStatus::Pending,
        PaymentStatus::Confirmed,
        PaymentStatus::Received,
        PaymentStatus::Overdue,
        PaymentStatus::Refunded,
        PaymentStatus::Cancelled,
        PaymentStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Received => "received",
            PaymentStatus::Overdue => "overdue",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Deleted => "deleted",
        }
    }

    /// No further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Refunded | PaymentStatus::Cancelled | PaymentStatus::Deleted
        )
    }

    /// Whether a payment in `self` may move to `next`.
    ///
    /// Staying in the same status is always allowed. `received` can only be
    /// refunded; `confirmed` and `overdue` may oscillate. Any open payment can
    /// be refunded, since chargebacks arrive regardless of the prior status.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        if *self == next {
            return true;
        }
        match self {
            Pending => matches!(
                next,
                Confirmed | Overdue | Received | Refunded | Deleted | Cancelled
            ),
            Confirmed => matches!(next, Overdue | Received | Refunded | Cancelled | Deleted),
            Overdue => matches!(next, Confirmed | Received | Refunded | Cancelled | Deleted),
            Received => next == Refunded,
            Refunded | Cancelled | Deleted => false,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaygateError;

    fn from_str(s: &str) -> Result<Self> {
        PaymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| PaygateError::InvalidPayload(format!("unknown payment status '{}'", s)))
    }
}

/// Canonical webhook event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebhookEventType {
    PaymentCreated,
    PaymentConfirmed,
    PaymentReceived,
    PaymentOverdue,
    PaymentRefunded,
    PaymentDeleted,
}

impl WebhookEventType {
    pub const ALL: [WebhookEventType; 6] = [
        WebhookEventType::PaymentCreated,
        WebhookEventType::PaymentConfirmed,
        WebhookEventType::PaymentReceived,
        WebhookEventType::PaymentOverdue,
        WebhookEventType::PaymentRefunded,
        WebhookEventType::PaymentDeleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventType::PaymentCreated => "PAYMENT_CREATED",
            WebhookEventType::PaymentConfirmed => "PAYMENT_CONFIRMED",
            WebhookEventType::PaymentReceived => "PAYMENT_RECEIVED",
            WebhookEventType::PaymentOverdue => "PAYMENT_OVERDUE",
            WebhookEventType::PaymentRefunded => "PAYMENT_REFUNDED",
            WebhookEventType::PaymentDeleted => "PAYMENT_DELETED",
        }
    }
}

impl fmt::Display for WebhookEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookEventType {
    type Err = PaygateError;

    fn from_str(s: &str) -> Result<Self> {
        WebhookEventType::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| PaygateError::InvalidPayload(format!("unknown webhook event '{}'", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    Boleto,
    CreditCard,
    Pix,
    Undefined,
}

impl BillingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingType::Boleto => "BOLETO",
            BillingType::CreditCard => "CREDIT_CARD",
            BillingType::Pix => "PIX",
            BillingType::Undefined => "UNDEFINED",
        }
    }
}

impl fmt::Display for BillingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Records
// ============================================================================

/// A customer as known by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCustomer {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    pub cpf_cnpj: String,
}

/// A payment as known by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPayment {
    pub id: String,
    pub customer_id: String,
    pub billing_type: BillingType,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    pub due_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_count: Option<u32>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub installment_value: Option<Decimal>,
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boleto_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pix_qr_code_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_receipt_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerParams {
    pub name: String,
    pub cpf_cnpj: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_number: Option<String>,
}

/// Parameters for a new charge. Serialized as-is into the `createPayment`
/// job payload and the gateway request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentParams {
    /// Gateway customer id.
    pub customer: String,
    pub billing_type: BillingType,
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
    /// `YYYY-MM-DD`.
    pub due_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_count: Option<u32>,
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub installment_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundParams {
    pub payment_id: String,
    /// Partial refund amount; full refund when absent.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RefundParams {
    pub fn full(payment_id: impl Into<String>) -> Self {
        Self {
            payment_id: payment_id.into(),
            value: None,
            description: None,
        }
    }
}

/// Payment fields carried by a webhook.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSnapshot {
    pub id: String,
    pub value: Option<Decimal>,
    pub customer: Option<String>,
    pub external_reference: Option<String>,
    /// Status exactly as the vendor sent it.
    pub raw_status: Option<String>,
    pub status: Option<PaymentStatus>,
    pub subscription: Option<String>,
    pub description: Option<String>,
    /// Billing type exactly as the vendor sent it.
    pub billing_type: Option<String>,
    pub net_value: Option<Decimal>,
    pub invoice_url: Option<String>,
    /// `paymentDate`, falling back to `clientPaymentDate`.
    pub payment_date: Option<String>,
}

/// A parsed inbound webhook. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    /// Vendor event id, when the vendor sends one.
    pub id: Option<String>,
    pub raw_event: String,
    pub event: WebhookEventType,
    pub payment: PaymentSnapshot,
}

// ============================================================================
// Provider trait
// ============================================================================

/// A payment gateway.
///
/// Implementations must be cheap to share behind an `Arc` and safe to call
/// from many workers at once.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Short provider name used in logs and the transaction log.
    fn name(&self) -> &str;

    async fn create_customer(&self, params: &CreateCustomerParams) -> Result<ProviderCustomer>;

    async fn get_customer_by_cpf_cnpj(&self, cpf_cnpj: &str) -> Result<Option<ProviderCustomer>>;

    /// Create a charge. The same `idempotency_key` must never produce two charges.
    async fn create_payment(
        &self,
        params: &CreatePaymentParams,
        idempotency_key: Option<&str>,
    ) -> Result<ProviderPayment>;

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment>;

    async fn get_payment_by_external_reference(
        &self,
        external_reference: &str,
    ) -> Result<Option<ProviderPayment>>;

    async fn refund_payment(&self, params: &RefundParams) -> Result<ProviderPayment>;

    async fn cancel_payment(&self, payment_id: &str) -> Result<()>;

    /// Interpret a raw webhook body. Fails only when `payment.id` is missing.
    fn parse_webhook(&self, body: &serde_json::Value) -> Result<WebhookEvent> {
        crate::providers::normalize::parse_webhook_body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_payment_status_display_and_parse() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_payment_status_serde() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Received).unwrap(),
            "\"received\""
        );
        let s: PaymentStatus = serde_json::from_str("\"overdue\"").unwrap();
        assert_eq!(s, PaymentStatus::Overdue);
    }

    #[test]
    fn test_event_type_serde_uses_canonical_spelling() {
        assert_eq!(
            serde_json::to_string(&WebhookEventType::PaymentReceived).unwrap(),
            "\"PAYMENT_RECEIVED\""
        );
        assert_eq!(
            "PAYMENT_DELETED".parse::<WebhookEventType>().unwrap(),
            WebhookEventType::PaymentDeleted
        );
    }

    #[test]
    fn test_received_only_moves_to_refunded() {
        use PaymentStatus::*;
        assert!(Received.can_transition_to(Refunded));
        for next in [Pending, Confirmed, Overdue, Cancelled, Deleted] {
            assert!(!Received.can_transition_to(next), "received -> {}", next);
        }
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        for from in [
            PaymentStatus::Refunded,
            PaymentStatus::Cancelled,
            PaymentStatus::Deleted,
        ] {
            assert!(from.is_terminal());
            for next in PaymentStatus::ALL {
                assert_eq!(from.can_transition_to(next), next == from);
            }
        }
    }

    #[test]
    fn test_open_payments_can_be_refunded() {
        use PaymentStatus::*;
        for from in [Pending, Confirmed, Overdue, Received] {
            assert!(from.can_transition_to(Refunded), "{} -> refunded", from);
        }
    }

    #[test]
    fn test_confirmed_overdue_oscillate() {
        assert!(PaymentStatus::Confirmed.can_transition_to(PaymentStatus::Overdue));
        assert!(PaymentStatus::Overdue.can_transition_to(PaymentStatus::Confirmed));
        assert!(!PaymentStatus::Confirmed.can_transition_to(PaymentStatus::Pending));
    }

    #[test]
    fn test_create_payment_params_wire_shape() {
        let params = CreatePaymentParams {
            customer: "cus_1".into(),
            billing_type: BillingType::Pix,
            value: dec!(150.50),
            due_date: "2024-07-01".into(),
            description: None,
            external_reference: Some("agreement_42".into()),
            installment_count: None,
            installment_value: None,
        };
        let v = serde_json::to_value(&params).unwrap();
        assert_eq!(
            v,
            json!({
                "customer": "cus_1",
                "billingType": "PIX",
                "value": 150.5,
                "dueDate": "2024-07-01",
                "externalReference": "agreement_42"
            })
        );
    }

    #[test]
    fn test_provider_payment_deserializes_optional_fields() {
        let p: ProviderPayment = serde_json::from_value(json!({
            "id": "pay_1",
            "customerId": "cus_1",
            "billingType": "BOLETO",
            "value": 99.9,
            "dueDate": "2024-07-01",
            "status": "pending"
        }))
        .unwrap();
        assert_eq!(p.value, dec!(99.9));
        assert!(p.boleto_url.is_none());
    }
}
