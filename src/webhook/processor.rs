//! Apply one webhook to the agreement it belongs to.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};

use super::resolver::{MatchTier, ReconciliationResolver};
use super::update::{derive_status_update, StatusUpdate};
use crate::error::{PaygateError, Result};
use crate::providers::{
    PaymentProvider, PaymentSnapshot, PaymentStatus, WebhookEvent, WebhookEventType,
};
use crate::store::{
    Agreement, AgreementPatch, AgreementStatus, AgreementStore, NotificationKind, Notifier,
    PaymentNotification,
};
use crate::utils::clock::Clock;

/// Description keywords of the platform's own subscription charges, which
/// share the gateway account but never belong to an agreement.
const PLATFORM_SUBSCRIPTION_MARKERS: &[&str] = &["plano", "assinatura"];

/// Result of processing one webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub payment_id: String,
    pub event: WebhookEventType,
    pub agreement_id: Option<String>,
    pub tier: Option<MatchTier>,
    pub payment_status: Option<PaymentStatus>,
    pub agreement_status: Option<AgreementStatus>,
    /// False for duplicates, stale events and ignored payments.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<String>,
}

fn is_platform_subscription(event: &WebhookEvent) -> bool {
    event
        .payment
        .description
        .as_deref()
        .map(str::to_lowercase)
        .is_some_and(|d| PLATFORM_SUBSCRIPTION_MARKERS.iter().any(|m| d.contains(m)))
}

/// The vendor's view of the payment, recorded on every matched webhook.
fn vendor_view(payment: &PaymentSnapshot, received_at: DateTime<Utc>) -> AgreementPatch {
    AgreementPatch {
        vendor_status: payment.raw_status.clone(),
        vendor_billing_type: payment.billing_type.clone(),
        vendor_net_value: payment.net_value,
        vendor_invoice_url: payment.invoice_url.clone(),
        vendor_payment_date: payment.payment_date.clone(),
        vendor_last_webhook_at: Some(received_at),
        ..Default::default()
    }
}

fn notification_for(
    kind: NotificationKind,
    agreement: &Agreement,
    amount: Decimal,
) -> Option<PaymentNotification> {
    let user_id = agreement.user_id.clone()?;
    let (title, description) = match kind {
        NotificationKind::PaymentConfirmed => (
            "Pagamento Confirmado",
            format!("Seu pagamento de R$ {:.2} foi confirmado com sucesso!", amount),
        ),
        NotificationKind::PaymentProcessing => (
            "Pagamento em Processamento",
            format!("Seu pagamento de R$ {:.2} está sendo processado.", amount),
        ),
        NotificationKind::PaymentOverdue => (
            "Pagamento em Atraso",
            format!("Seu pagamento de R$ {:.2} está em atraso.", amount),
        ),
    };
    Some(PaymentNotification {
        user_id,
        company_id: agreement.company_id.clone(),
        agreement_id: agreement.id.clone(),
        kind,
        title: title.to_string(),
        description,
    })
}

pub struct WebhookProcessor {
    provider: Arc<dyn PaymentProvider>,
    resolver: ReconciliationResolver,
    store: Arc<dyn AgreementStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl WebhookProcessor {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        store: Arc<dyn AgreementStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            resolver: ReconciliationResolver::new(store.clone()),
            store,
            notifier,
            clock,
        }
    }

    /// Parse, resolve and apply a raw webhook body for `tenant`.
    pub async fn process(&self, tenant: &str, raw: &Value) -> Result<WebhookOutcome> {
        let event = self.provider.parse_webhook(raw)?;
        let span = info_span!(
            "webhook",
            tenant = %tenant,
            payment_id = %event.payment.id,
            event = %event.event
        );
        self.process_event(event).instrument(span).await
    }

    async fn process_event(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        let mut outcome = WebhookOutcome {
            payment_id: event.payment.id.clone(),
            event: event.event,
            agreement_id: None,
            tier: None,
            payment_status: None,
            agreement_status: None,
            applied: false,
            ignored: None,
        };

        let resolution = match self.resolver.resolve(&event).await {
            Ok(resolution) => resolution,
            Err(PaygateError::AgreementNotFound { .. }) if is_platform_subscription(&event) => {
                info!("Platform subscription payment, no agreement to update");
                outcome.ignored = Some("platform subscription payment".to_string());
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        let agreement = resolution.agreement;
        outcome.agreement_id = Some(agreement.id.clone());
        outcome.tier = Some(resolution.tier);

        let update =
            derive_status_update(event.event, agreement.payment_status, agreement.status);
        if update.is_noop() {
            debug!(
                agreement_id = %agreement.id,
                payment_status = %agreement.payment_status,
                "Webhook does not change the agreement"
            );
            self.store
                .apply_update(&agreement.id, &vendor_view(&event.payment, self.clock.now()))
                .await?;
            outcome.payment_status = Some(agreement.payment_status);
            outcome.agreement_status = Some(agreement.status);
            return Ok(outcome);
        }

        let updated = self.apply(&agreement, &update, &event).await?;
        info!(
            agreement_id = %updated.id,
            tier = %resolution.tier,
            payment_status = %updated.payment_status,
            agreement_status = %updated.status,
            "Agreement updated from webhook"
        );
        outcome.payment_status = Some(updated.payment_status);
        outcome.agreement_status = Some(updated.status);
        outcome.applied = true;
        Ok(outcome)
    }

    /// Debt first, agreement second: a failure before the agreement write
    /// leaves the update pending, so a retry recomputes and reapplies it.
    async fn apply(
        &self,
        agreement: &Agreement,
        update: &StatusUpdate,
        event: &WebhookEvent,
    ) -> Result<Agreement> {
        if let Some(debt_status) = update.debt_status {
            self.store
                .set_debt_status(&agreement.debt_id, debt_status)
                .await?;
        }

        let now = self.clock.now();
        let patch = AgreementPatch {
            payment_status: update.payment_status,
            status: update.agreement_status,
            payment_received_at: update.payment_received.then_some(now),
            updated_at: Some(now),
            ..vendor_view(&event.payment, now)
        };
        let updated = self.store.apply_update(&agreement.id, &patch).await?;

        if let Some(kind) = update.notification {
            let amount = event.payment.value.unwrap_or(agreement.agreed_amount);
            if let Some(notification) = notification_for(kind, &updated, amount) {
                if let Err(e) = self.notifier.notify(notification).await {
                    warn!(agreement_id = %updated.id, error = %e, "Failed to send notification");
                }
            }
        }
        Ok(updated)
    }
}
