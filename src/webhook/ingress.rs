//! Front door for gateway webhooks.
//!
//! Authenticates, rate limits and deduplicates a delivery, then enqueues it.
//! Nothing here touches an agreement; the queue worker does that.

use serde_json::Value;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::dedup::EventDeduplicator;
use crate::error::{PaygateError, Result};
use crate::queue::{JobHandle, JobOperation, JobQueue};
use crate::security::pci;
use crate::security::rate_limit::TenantRateLimiter;

/// Header the gateway uses to send the shared webhook token.
pub const ACCESS_TOKEN_HEADER: &str = "asaas-access-token";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressOutcome {
    Enqueued(JobHandle),
    /// Already seen within the dedup window.
    Duplicate,
}

pub struct WebhookIngress {
    access_token: Option<String>,
    limiter: Arc<TenantRateLimiter>,
    dedup: Arc<EventDeduplicator>,
    queue: Arc<JobQueue>,
}

impl WebhookIngress {
    pub fn new(
        access_token: Option<String>,
        limiter: Arc<TenantRateLimiter>,
        dedup: Arc<EventDeduplicator>,
        queue: Arc<JobQueue>,
    ) -> Self {
        Self {
            access_token: access_token.filter(|t| !t.is_empty()),
            limiter,
            dedup,
            queue,
        }
    }

    fn authenticate(&self, presented: Option<&str>) -> Result<()> {
        let Some(expected) = &self.access_token else {
            return Ok(());
        };
        let presented = presented.unwrap_or_default();
        if bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) {
            Ok(())
        } else {
            Err(PaygateError::Unauthorized(
                "invalid webhook access token".to_string(),
            ))
        }
    }

    /// Accept one delivery for `tenant`.
    pub async fn receive(
        &self,
        tenant: &str,
        access_token: Option<&str>,
        body: &[u8],
    ) -> Result<IngressOutcome> {
        if let Err(e) = self.authenticate(access_token) {
            warn!(tenant = %tenant, "Rejected webhook with a bad access token");
            return Err(e);
        }
        self.limiter.check_ingress(tenant)?;

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| PaygateError::InvalidPayload(format!("webhook body is not JSON: {}", e)))?;
        let has_payment_id = payload
            .pointer("/payment/id")
            .is_some_and(|id| id.as_str().is_some_and(|s| !s.is_empty()));
        if !has_payment_id {
            warn!(
                tenant = %tenant,
                payload = %pci::sanitized_json(&payload),
                "Webhook without payment.id"
            );
            return Err(PaygateError::InvalidPayload(
                "webhook is missing payment.id".to_string(),
            ));
        }

        let key = EventDeduplicator::key_for(payload.get("id").and_then(Value::as_str), body);
        if !self.dedup.check_and_record(&key) {
            debug!(tenant = %tenant, key = %key, "Duplicate webhook dropped");
            return Ok(IngressOutcome::Duplicate);
        }

        let handle = match self
            .queue
            .enqueue(JobOperation::ProcessWebhook { raw_payload: payload }, tenant)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                // Let the gateway's redelivery through.
                self.dedup.forget(&key);
                return Err(e);
            }
        };
        info!(tenant = %tenant, job_id = %handle.id, "Webhook accepted");
        Ok(IngressOutcome::Enqueued(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{QueueConfig, RateLimitConfig};
    use crate::queue::MemoryJobStore;
    use crate::utils::clock::{Clock, ManualClock};
    use serde_json::json;

    fn ingress(token: Option<&str>, max_requests: u32) -> (WebhookIngress, Arc<JobQueue>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let limiter = Arc::new(TenantRateLimiter::new(
            RateLimitConfig {
                max_requests,
                window_ms: 60_000,
            },
            RateLimitConfig::default(),
            clock.clone(),
        ));
        let dedup = Arc::new(EventDeduplicator::new(3_600, 100, clock.clone()));
        let queue = Arc::new(JobQueue::new(
            Arc::new(MemoryJobStore::new()),
            QueueConfig::default(),
            clock,
        ));
        (
            WebhookIngress::new(token.map(str::to_string), limiter, dedup, queue.clone()),
            queue,
        )
    }

    fn body(event_id: Option<&str>) -> Vec<u8> {
        let mut value = json!({
            "event": "PAYMENT_RECEIVED",
            "payment": { "id": "pay_1", "value": 10.0 }
        });
        if let Some(id) = event_id {
            value["id"] = json!(id);
        }
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn test_enqueues_then_drops_duplicate() {
        let (ingress, queue) = ingress(Some("secret"), 100);
        let first = ingress
            .receive("company_a", Some("secret"), &body(Some("evt_1")))
            .await
            .unwrap();
        let IngressOutcome::Enqueued(handle) = first else {
            panic!("expected enqueue");
        };
        assert_eq!(handle.operation, "processWebhook");

        let second = ingress
            .receive("company_a", Some("secret"), &body(Some("evt_1")))
            .await
            .unwrap();
        assert_eq!(second, IngressOutcome::Duplicate);
        assert_eq!(queue.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_body_digest_dedups_without_event_id() {
        let (ingress, _) = ingress(None, 100);
        assert!(matches!(
            ingress.receive("t", None, &body(None)).await.unwrap(),
            IngressOutcome::Enqueued(_)
        ));
        assert_eq!(
            ingress.receive("t", None, &body(None)).await.unwrap(),
            IngressOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn test_bad_token_rejected() {
        let (ingress, queue) = ingress(Some("secret"), 100);
        for token in [None, Some("wrong"), Some("secret2")] {
            assert!(matches!(
                ingress.receive("t", token, &body(Some("evt_1"))).await,
                Err(PaygateError::Unauthorized(_))
            ));
        }
        assert!(queue.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_per_tenant() {
        let (ingress, _) = ingress(None, 1);
        ingress.receive("a", None, &body(Some("e1"))).await.unwrap();
        assert!(matches!(
            ingress.receive("a", None, &body(Some("e2"))).await,
            Err(PaygateError::RateLimited { .. })
        ));
        ingress.receive("b", None, &body(Some("e3"))).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_payloads() {
        let (ingress, _) = ingress(None, 100);
        assert!(matches!(
            ingress.receive("t", None, b"not json").await,
            Err(PaygateError::InvalidPayload(_))
        ));
        assert!(matches!(
            ingress
                .receive("t", None, br#"{"event":"PAYMENT_RECEIVED","payment":{}}"#)
                .await,
            Err(PaygateError::InvalidPayload(_))
        ));
    }
}
