//! Map a webhook onto exactly one agreement.
//!
//! Vendors key webhooks weakly, so the resolver tries four strategies in
//! strict order and stops at the first hit:
//!
//! 1. [`MatchTier::Direct`]: the vendor payment id already bound to an agreement.
//! 2. [`MatchTier::Subscription`]: the vendor subscription behind an installment plan.
//! 3. [`MatchTier::ExternalReference`]: `agreement_<debt external id>`.
//! 4. [`MatchTier::Heuristic`]: same vendor customer and exactly the same amount.
//!
//! A heuristic hit binds the payment id to the agreement so the next webhook
//! for the same payment resolves directly.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{PaygateError, Result};
use crate::providers::WebhookEvent;
use crate::security::pci;
use crate::store::{Agreement, AgreementStore};

/// Prefix the payment service writes into `externalReference`.
pub const EXTERNAL_REFERENCE_PREFIX: &str = "agreement_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Direct,
    Subscription,
    ExternalReference,
    Heuristic,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchTier::Direct => "direct",
            MatchTier::Subscription => "subscription",
            MatchTier::ExternalReference => "external_reference",
            MatchTier::Heuristic => "heuristic",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub agreement: Agreement,
    pub tier: MatchTier,
}

/// External reference for an agreement's debt.
pub fn external_reference_for(debt_external_id: &str) -> String {
    format!("{}{}", EXTERNAL_REFERENCE_PREFIX, debt_external_id)
}

fn most_recent(mut candidates: Vec<Agreement>) -> Option<Agreement> {
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    candidates.into_iter().next()
}

pub struct ReconciliationResolver {
    store: Arc<dyn AgreementStore>,
}

impl ReconciliationResolver {
    pub fn new(store: Arc<dyn AgreementStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, event: &WebhookEvent) -> Result<Resolution> {
        let payment = &event.payment;

        if let Some(agreement) = self.store.find_by_vendor_payment_id(&payment.id).await? {
            return Ok(Resolution {
                agreement,
                tier: MatchTier::Direct,
            });
        }

        if let Some(subscription) = payment.subscription.as_deref() {
            if let Some(agreement) = self
                .store
                .find_by_vendor_subscription_id(subscription)
                .await?
            {
                return Ok(Resolution {
                    agreement,
                    tier: MatchTier::Subscription,
                });
            }
        }

        if let Some(debt_external_id) = payment
            .external_reference
            .as_deref()
            .and_then(|r| r.strip_prefix(EXTERNAL_REFERENCE_PREFIX))
            .filter(|id| !id.is_empty())
        {
            let candidates = self
                .store
                .agreements_by_debt_external_id(debt_external_id)
                .await?;
            if let Some(agreement) = most_recent(candidates) {
                return Ok(Resolution {
                    agreement,
                    tier: MatchTier::ExternalReference,
                });
            }
        }

        if let (Some(customer), Some(amount)) = (payment.customer.as_deref(), payment.value) {
            let candidates = self
                .store
                .agreements_by_customer_and_amount(customer, amount)
                .await?;
            if candidates.len() > 1 {
                warn!(
                    payment_id = %payment.id,
                    customer = %customer,
                    candidates = candidates.len(),
                    "Ambiguous heuristic match, using the most recent agreement"
                );
            }
            if let Some(agreement) = most_recent(candidates) {
                self.store
                    .bind_vendor_payment(&agreement.id, &payment.id, Some(customer.to_string()))
                    .await?;
                info!(
                    payment_id = %payment.id,
                    agreement_id = %agreement.id,
                    "Bound vendor payment to agreement by customer and amount"
                );
                return Ok(Resolution {
                    agreement,
                    tier: MatchTier::Heuristic,
                });
            }
        }

        let snapshot = serde_json::to_value(event).unwrap_or_default();
        error!(
            payment_id = %payment.id,
            event = %pci::sanitized_json(&snapshot),
            "No agreement matches webhook"
        );
        Err(PaygateError::AgreementNotFound {
            payment_id: payment.id.clone(),
        })
    }
}
