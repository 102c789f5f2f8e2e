//! In-memory gateway for test mode.
//!
//! Keeps customers and payments in process memory, enforces the payment
//! lifecycle and can emit vendor-shaped webhook bodies so the whole
//! reconciliation path can be driven without a real gateway.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::types::{
    BillingType, CreateCustomerParams, CreatePaymentParams, PaymentStatus, ProviderCustomer,
    ProviderPayment, WebhookEventType,
};
use crate::error::{PaygateError, Result};
use crate::utils::clock::{Clock, SystemClock};

const TEST_GATEWAY_BASE: &str = "https://test-gateway.local";

#[derive(Debug, Clone)]
pub struct SimulatedCustomer {
    pub customer: ProviderCustomer,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SimulatedPayment {
    pub payment: ProviderPayment,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct SimState {
    customers: HashMap<String, SimulatedCustomer>,
    customers_by_cpf_cnpj: HashMap<String, String>,
    payments: HashMap<String, SimulatedPayment>,
    payments_by_external_ref: HashMap<String, String>,
    payments_by_idempotency_key: HashMap<String, String>,
}

pub struct TestModeSimulator {
    clock: Arc<dyn Clock>,
    state: Mutex<SimState>,
}

impl Default for TestModeSimulator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

fn short_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &uuid[..8])
}

impl TestModeSimulator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a customer, or return the existing one with the same tax id.
    pub fn create_customer(&self, params: &CreateCustomerParams) -> ProviderCustomer {
        let mut state = self.state();
        if let Some(existing) = state
            .customers_by_cpf_cnpj
            .get(&params.cpf_cnpj)
            .and_then(|id| state.customers.get(id))
        {
            return existing.customer.clone();
        }

        let customer = ProviderCustomer {
            id: short_id("test_cus"),
            name: params.name.clone(),
            email: params.email.clone(),
            phone: params.phone.clone(),
            mobile_phone: params.mobile_phone.clone(),
            cpf_cnpj: params.cpf_cnpj.clone(),
        };
        state
            .customers_by_cpf_cnpj
            .insert(customer.cpf_cnpj.clone(), customer.id.clone());
        state.customers.insert(
            customer.id.clone(),
            SimulatedCustomer {
                customer: customer.clone(),
                created_at: self.clock.now(),
            },
        );
        customer
    }

    pub fn get_customer_by_cpf_cnpj(&self, cpf_cnpj: &str) -> Option<ProviderCustomer> {
        let state = self.state();
        state
            .customers_by_cpf_cnpj
            .get(cpf_cnpj)
            .and_then(|id| state.customers.get(id))
            .map(|c| c.customer.clone())
    }

    /// Create a pending payment. A repeated idempotency key returns the
    /// payment created the first time.
    pub fn create_payment(
        &self,
        params: &CreatePaymentParams,
        idempotency_key: Option<&str>,
    ) -> ProviderPayment {
        let mut state = self.state();
        if let Some(existing) = idempotency_key
            .and_then(|key| state.payments_by_idempotency_key.get(key))
            .and_then(|id| state.payments.get(id))
        {
            return existing.payment.clone();
        }

        let id = short_id("test_pay");
        let boleto_url = format!("{}/boleto/{}", TEST_GATEWAY_BASE, id);
        let pix_url = format!("{}/pix/{}", TEST_GATEWAY_BASE, id);
        let (boleto_url, pix_qr_code_url) = match params.billing_type {
            BillingType::Boleto => (Some(boleto_url), None),
            BillingType::Pix => (None, Some(pix_url)),
            BillingType::Undefined => (Some(boleto_url), Some(pix_url)),
            BillingType::CreditCard => (None, None),
        };

        let payment = ProviderPayment {
            id: id.clone(),
            customer_id: params.customer.clone(),
            billing_type: params.billing_type,
            value: params.value,
            due_date: params.due_date.clone(),
            description: params.description.clone(),
            external_reference: params.external_reference.clone(),
            installment_count: params.installment_count,
            installment_value: params.installment_value,
            status: PaymentStatus::Pending,
            payment_url: Some(format!("{}/pay/{}", TEST_GATEWAY_BASE, id)),
            boleto_url,
            pix_qr_code_url,
            transaction_receipt_url: None,
        };

        let now = self.clock.now();
        if let Some(ext) = &payment.external_reference {
            state.payments_by_external_ref.insert(ext.clone(), id.clone());
        }
        if let Some(key) = idempotency_key {
            state
                .payments_by_idempotency_key
                .insert(key.to_string(), id.clone());
        }
        state.payments.insert(
            id,
            SimulatedPayment {
                payment: payment.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        payment
    }

    pub fn get_payment(&self, payment_id: &str) -> Option<ProviderPayment> {
        self.state()
            .payments
            .get(payment_id)
            .map(|p| p.payment.clone())
    }

    pub fn get_payment_by_external_reference(
        &self,
        external_reference: &str,
    ) -> Option<ProviderPayment> {
        let state = self.state();
        state
            .payments_by_external_ref
            .get(external_reference)
            .and_then(|id| state.payments.get(id))
            .map(|p| p.payment.clone())
    }

    /// Move a payment to `next`. A forced move skips the lifecycle check, as
    /// refunds and cancellations do on the real gateway.
    fn transition(
        &self,
        payment_id: &str,
        next: PaymentStatus,
        forced: bool,
    ) -> Result<ProviderPayment> {
        let now = self.clock.now();
        let mut state = self.state();
        let entry = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| PaygateError::NotFound(format!("payment {}", payment_id)))?;

        let current = entry.payment.status;
        if !forced && !current.can_transition_to(next) {
            return Err(PaygateError::InvalidTransition(format!(
                "payment {} cannot move from {} to {}",
                payment_id, current, next
            )));
        }
        entry.payment.status = next;
        entry.updated_at = now;
        if next == PaymentStatus::Received {
            entry.payment.transaction_receipt_url =
                Some(format!("{}/receipt/{}", TEST_GATEWAY_BASE, payment_id));
        }
        Ok(entry.payment.clone())
    }

    pub fn simulate_payment_confirmation(&self, payment_id: &str) -> Result<ProviderPayment> {
        self.transition(payment_id, PaymentStatus::Confirmed, false)
    }

    pub fn simulate_payment_received(&self, payment_id: &str) -> Result<ProviderPayment> {
        self.transition(payment_id, PaymentStatus::Received, false)
    }

    pub fn simulate_payment_overdue(&self, payment_id: &str) -> Result<ProviderPayment> {
        self.transition(payment_id, PaymentStatus::Overdue, false)
    }

    pub fn simulate_refund(&self, payment_id: &str) -> Result<ProviderPayment> {
        self.transition(payment_id, PaymentStatus::Refunded, true)
    }

    pub fn cancel_payment(&self, payment_id: &str) -> Result<ProviderPayment> {
        self.transition(payment_id, PaymentStatus::Cancelled, true)
    }

    /// Build a vendor-shaped webhook body describing the payment's current state.
    pub fn webhook_payload(&self, payment_id: &str, event: WebhookEventType) -> Result<Value> {
        let payment = self
            .get_payment(payment_id)
            .ok_or_else(|| PaygateError::NotFound(format!("payment {}", payment_id)))?;
        let wire = serde_json::to_value(&payment)?;

        Ok(json!({
            "id": short_id("test_evt"),
            "event": event.as_str(),
            "payment": {
                "id": payment.id,
                "customer": payment.customer_id,
                "value": wire["value"],
                "status": payment.status.as_str().to_uppercase(),
                "billingType": wire["billingType"],
                "externalReference": payment.external_reference,
                "description": payment.description,
                "invoiceUrl": payment.payment_url,
            }
        }))
    }

    pub fn payment_count(&self) -> usize {
        self.state().payments.len()
    }

    pub fn customer_count(&self) -> usize {
        self.state().customers.len()
    }
}
