//! Persistence collaborators.
//!
//! Agreements, debts and notifications live in the host application's
//! database. The core only talks to them through [`AgreementStore`] and
//! [`Notifier`]; [`InMemoryAgreementStore`] and the notifiers here back the
//! test-mode runtime and the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::error::{PaygateError, Result};
use crate::providers::PaymentStatus;

/// Negotiated-agreement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementStatus {
    Pending,
    Active,
    Paid,
    Cancelled,
}

impl AgreementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementStatus::Pending => "pending",
            AgreementStatus::Active => "active",
            AgreementStatus::Paid => "paid",
            AgreementStatus::Cancelled => "cancelled",
        }
    }

    /// `paid` can only be cancelled (refund); `cancelled` is terminal.
    pub fn can_transition_to(&self, next: AgreementStatus) -> bool {
        use AgreementStatus::*;
        if *self == next {
            return true;
        }
        match self {
            Pending => matches!(next, Active | Paid | Cancelled),
            Active => matches!(next, Paid | Cancelled),
            Paid => next == Cancelled,
            Cancelled => false,
        }
    }
}

impl fmt::Display for AgreementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Open,
    Paid,
}

impl fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DebtStatus::Open => "open",
            DebtStatus::Paid => "paid",
        })
    }
}

/// A negotiated settlement of a debt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: String,
    /// Tenant.
    pub company_id: String,
    pub debt_id: String,
    /// External identifier of the debt, joined in by the store.
    pub debt_external_id: Option<String>,
    /// Notification recipient.
    pub user_id: Option<String>,
    pub original_amount: Decimal,
    pub agreed_amount: Decimal,
    pub installments: u32,
    pub status: AgreementStatus,
    pub payment_status: PaymentStatus,
    pub vendor_payment_id: Option<String>,
    pub vendor_customer_id: Option<String>,
    /// Vendor subscription backing an installment plan.
    pub vendor_subscription_id: Option<String>,
    /// The vendor's last reported view of the payment.
    pub vendor_status: Option<String>,
    pub vendor_billing_type: Option<String>,
    pub vendor_net_value: Option<Decimal>,
    pub vendor_invoice_url: Option<String>,
    pub vendor_payment_date: Option<String>,
    pub vendor_last_webhook_at: Option<DateTime<Utc>>,
    pub payment_received_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agreement {
    /// A fresh pending agreement.
    pub fn new(
        id: impl Into<String>,
        company_id: impl Into<String>,
        debt_id: impl Into<String>,
        agreed_amount: Decimal,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            company_id: company_id.into(),
            debt_id: debt_id.into(),
            debt_external_id: None,
            user_id: None,
            original_amount: agreed_amount,
            agreed_amount,
            installments: 1,
            status: AgreementStatus::Pending,
            payment_status: PaymentStatus::Pending,
            vendor_payment_id: None,
            vendor_customer_id: None,
            vendor_subscription_id: None,
            vendor_status: None,
            vendor_billing_type: None,
            vendor_net_value: None,
            vendor_invoice_url: None,
            vendor_payment_date: None,
            vendor_last_webhook_at: None,
            payment_received_at: None,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Fields a webhook may change on an agreement. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgreementPatch {
    pub payment_status: Option<PaymentStatus>,
    pub status: Option<AgreementStatus>,
    pub payment_received_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub vendor_status: Option<String>,
    pub vendor_billing_type: Option<String>,
    pub vendor_net_value: Option<Decimal>,
    pub vendor_invoice_url: Option<String>,
    pub vendor_payment_date: Option<String>,
    pub vendor_last_webhook_at: Option<DateTime<Utc>>,
}

fn overwrite<T: Clone>(field: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        field.clone_from(value);
    }
}

impl AgreementPatch {
    fn apply_to(&self, agreement: &mut Agreement) {
        if let Some(status) = self.payment_status {
            agreement.payment_status = status;
        }
        if let Some(status) = self.status {
            agreement.status = status;
        }
        if let Some(at) = self.payment_received_at {
            agreement.payment_received_at = Some(at);
        }
        if let Some(at) = self.updated_at {
            agreement.updated_at = at;
        }
        overwrite(&mut agreement.vendor_status, &self.vendor_status);
        overwrite(&mut agreement.vendor_billing_type, &self.vendor_billing_type);
        overwrite(&mut agreement.vendor_net_value, &self.vendor_net_value);
        overwrite(&mut agreement.vendor_invoice_url, &self.vendor_invoice_url);
        overwrite(&mut agreement.vendor_payment_date, &self.vendor_payment_date);
        overwrite(
            &mut agreement.vendor_last_webhook_at,
            &self.vendor_last_webhook_at,
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PaymentConfirmed,
    PaymentProcessing,
    PaymentOverdue,
}

/// A message for the debtor about their payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentNotification {
    pub user_id: String,
    pub company_id: String,
    pub agreement_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
}

/// Agreement persistence. Each write is a single-row, last-write-wins update.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgreementStore: Send + Sync {
    async fn get(&self, agreement_id: &str) -> Result<Option<Agreement>>;

    async fn find_by_vendor_payment_id(&self, payment_id: &str) -> Result<Option<Agreement>>;

    async fn find_by_vendor_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Agreement>>;

    /// Agreements whose debt carries this external id, any order.
    async fn agreements_by_debt_external_id(&self, external_id: &str) -> Result<Vec<Agreement>>;

    /// Agreements bound to this vendor customer with exactly this agreed amount.
    async fn agreements_by_customer_and_amount(
        &self,
        customer_id: &str,
        amount: Decimal,
    ) -> Result<Vec<Agreement>>;

    /// Record the vendor payment (and customer, when known) on an agreement.
    async fn bind_vendor_payment(
        &self,
        agreement_id: &str,
        payment_id: &str,
        customer_id: Option<String>,
    ) -> Result<()>;

    async fn apply_update(&self, agreement_id: &str, patch: &AgreementPatch) -> Result<Agreement>;

    async fn set_debt_status(&self, debt_id: &str, status: DebtStatus) -> Result<()>;
}

/// Delivery of debtor notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: PaymentNotification) -> Result<()>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Debt {
    pub id: String,
    pub external_id: Option<String>,
    pub status: DebtStatus,
}

#[derive(Default)]
struct MemoryState {
    agreements: HashMap<String, Agreement>,
    debts: HashMap<String, Debt>,
}

/// Process-local agreement store.
#[derive(Default)]
pub struct InMemoryAgreementStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAgreementStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_debt(&self, debt: Debt) {
        self.lock().debts.insert(debt.id.clone(), debt);
    }

    /// Insert an agreement, filling `debt_external_id` from a known debt.
    pub fn insert_agreement(&self, mut agreement: Agreement) {
        let mut state = self.lock();
        if agreement.debt_external_id.is_none() {
            agreement.debt_external_id = state
                .debts
                .get(&agreement.debt_id)
                .and_then(|d| d.external_id.clone());
        }
        state.agreements.insert(agreement.id.clone(), agreement);
    }

    pub fn debt(&self, debt_id: &str) -> Option<Debt> {
        self.lock().debts.get(debt_id).cloned()
    }

    pub fn agreement(&self, agreement_id: &str) -> Option<Agreement> {
        self.lock().agreements.get(agreement_id).cloned()
    }

    fn filtered(&self, pred: impl Fn(&Agreement) -> bool) -> Vec<Agreement> {
        self.lock()
            .agreements
            .values()
            .filter(|a| pred(a))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AgreementStore for InMemoryAgreementStore {
    async fn get(&self, agreement_id: &str) -> Result<Option<Agreement>> {
        Ok(self.agreement(agreement_id))
    }

    async fn find_by_vendor_payment_id(&self, payment_id: &str) -> Result<Option<Agreement>> {
        Ok(self
            .filtered(|a| a.vendor_payment_id.as_deref() == Some(payment_id))
            .into_iter()
            .next())
    }

    async fn find_by_vendor_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Agreement>> {
        Ok(self
            .filtered(|a| a.vendor_subscription_id.as_deref() == Some(subscription_id))
            .into_iter()
            .max_by_key(|a| a.created_at))
    }

    async fn agreements_by_debt_external_id(&self, external_id: &str) -> Result<Vec<Agreement>> {
        Ok(self.filtered(|a| a.debt_external_id.as_deref() == Some(external_id)))
    }

    async fn agreements_by_customer_and_amount(
        &self,
        customer_id: &str,
        amount: Decimal,
    ) -> Result<Vec<Agreement>> {
        Ok(self.filtered(|a| {
            a.vendor_customer_id.as_deref() == Some(customer_id) && a.agreed_amount == amount
        }))
    }

    async fn bind_vendor_payment(
        &self,
        agreement_id: &str,
        payment_id: &str,
        customer_id: Option<String>,
    ) -> Result<()> {
        let mut state = self.lock();
        let agreement = state
            .agreements
            .get_mut(agreement_id)
            .ok_or_else(|| PaygateError::NotFound(format!("agreement {}", agreement_id)))?;
        agreement.vendor_payment_id = Some(payment_id.to_string());
        if customer_id.is_some() {
            agreement.vendor_customer_id = customer_id;
        }
        Ok(())
    }

    async fn apply_update(&self, agreement_id: &str, patch: &AgreementPatch) -> Result<Agreement> {
        let mut state = self.lock();
        let agreement = state
            .agreements
            .get_mut(agreement_id)
            .ok_or_else(|| PaygateError::NotFound(format!("agreement {}", agreement_id)))?;
        patch.apply_to(agreement);
        Ok(agreement.clone())
    }

    async fn set_debt_status(&self, debt_id: &str, status: DebtStatus) -> Result<()> {
        let mut state = self.lock();
        let debt = state
            .debts
            .get_mut(debt_id)
            .ok_or_else(|| PaygateError::NotFound(format!("debt {}", debt_id)))?;
        debt.status = status;
        Ok(())
    }
}

/// Emits notifications as tracing events.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: PaymentNotification) -> Result<()> {
        tracing::info!(
            user_id = %notification.user_id,
            agreement_id = %notification.agreement_id,
            title = %notification.title,
            "{}",
            notification.description
        );
        Ok(())
    }
}

/// Keeps every notification in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<PaymentNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<PaymentNotification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: PaymentNotification) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notification);
        Ok(())
    }
}
