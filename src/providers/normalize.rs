//! Vendor status and event normalization.
//!
//! Both mappings are total: anything unrecognised falls back to
//! `pending` / `PAYMENT_CREATED`, the least committal canonical value.

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

use super::types::{PaymentSnapshot, PaymentStatus, WebhookEvent, WebhookEventType};
use crate::error::{PaygateError, Result};

static STATUS_MAP: Lazy<HashMap<&'static str, PaymentStatus>> = Lazy::new(|| {
    use PaymentStatus::*;
    HashMap::from([
        ("PENDING", Pending),
        ("CONFIRMED", Confirmed),
        ("RECEIVED", Received),
        ("OVERDUE", Overdue),
        ("REFUNDED", Refunded),
        ("DELETED", Deleted),
        ("CANCELLED", Cancelled),
        ("REFUND_REQUESTED", Refunded),
        ("CHARGEBACK_REQUESTED", Refunded),
        ("CHARGEBACK_DISPUTE", Refunded),
        ("AWAITING_CHARGEBACK_REVERSAL", Refunded),
        ("DUNNING_REQUESTED", Overdue),
        ("DUNNING_RECEIVED", Received),
        ("AWAITING_RISK_ANALYSIS", Pending),
    ])
});

static EVENT_MAP: Lazy<HashMap<&'static str, WebhookEventType>> = Lazy::new(|| {
    use WebhookEventType::*;
    HashMap::from([
        ("PAYMENT_CREATED", PaymentCreated),
        ("PAYMENT_UPDATED", PaymentConfirmed),
        ("PAYMENT_CONFIRMED", PaymentConfirmed),
        ("PAYMENT_RECEIVED", PaymentReceived),
        ("PAYMENT_OVERDUE", PaymentOverdue),
        ("PAYMENT_DELETED", PaymentDeleted),
        ("PAYMENT_RESTORED", PaymentCreated),
        ("PAYMENT_REFUNDED", PaymentRefunded),
        ("PAYMENT_RECEIVED_IN_CASH_UNDONE", PaymentRefunded),
        ("PAYMENT_CHARGEBACK_REQUESTED", PaymentRefunded),
        ("PAYMENT_CHARGEBACK_DISPUTE", PaymentRefunded),
        ("PAYMENT_AWAITING_CHARGEBACK_REVERSAL", PaymentRefunded),
        ("PAYMENT_DUNNING_RECEIVED", PaymentReceived),
        ("PAYMENT_DUNNING_REQUESTED", PaymentOverdue),
        ("PAYMENT_BANK_SLIP_VIEWED", PaymentConfirmed),
        ("PAYMENT_CHECKOUT_VIEWED", PaymentConfirmed),
    ])
});

/// Map a vendor payment status onto the canonical set.
pub fn map_status(vendor_status: &str) -> PaymentStatus {
    STATUS_MAP
        .get(vendor_status)
        .copied()
        .unwrap_or(PaymentStatus::Pending)
}

/// Map a vendor webhook event name onto the canonical set.
pub fn map_event(vendor_event: &str) -> WebhookEventType {
    EVENT_MAP
        .get(vendor_event)
        .copied()
        .unwrap_or(WebhookEventType::PaymentCreated)
}

fn string_field(obj: &Value, key: &str) -> Option<String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// JSON numbers are parsed from their literal text so `150.1` stays exact.
fn decimal_field(obj: &Value, key: &str) -> Option<Decimal> {
    match obj.get(key)? {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Parse a vendor-shaped webhook body:
/// `{ id?, event, payment: { id, value, customer?, externalReference?, status?, ... } }`.
///
/// The event and status are normalized; only a missing `payment.id` is an error.
pub fn parse_webhook_body(body: &Value) -> Result<WebhookEvent> {
    let payment = body
        .get("payment")
        .filter(|p| p.is_object())
        .ok_or_else(|| PaygateError::InvalidPayload("webhook payload has no payment object".into()))?;

    let payment_id = string_field(payment, "id")
        .ok_or_else(|| PaygateError::InvalidPayload("webhook payload missing payment.id".into()))?;

    let raw_event = body
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let raw_status = string_field(payment, "status");

    Ok(WebhookEvent {
        id: string_field(body, "id"),
        event: map_event(&raw_event),
        raw_event,
        payment: PaymentSnapshot {
            id: payment_id,
            value: decimal_field(payment, "value"),
            customer: string_field(payment, "customer"),
            external_reference: string_field(payment, "externalReference"),
            status: raw_status.as_deref().map(map_status),
            raw_status,
            subscription: string_field(payment, "subscription"),
            description: string_field(payment, "description"),
            billing_type: string_field(payment, "billingType"),
            net_value: decimal_field(payment, "netValue"),
            invoice_url: string_field(payment, "invoiceUrl"),
            payment_date: string_field(payment, "paymentDate")
                .or_else(|| string_field(payment, "clientPaymentDate")),
        },
    })
}
