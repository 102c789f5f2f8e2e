//! Job records and retry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::config::RetryConfig;
use crate::providers::CreatePaymentParams;
use crate::security::pci;

/// Payload of a `createPayment` job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentJob {
    pub agreement_id: String,
    #[serde(flatten)]
    pub params: CreatePaymentParams,
}

/// Work a job performs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum JobOperation {
    CreatePayment(CreatePaymentJob),
    #[serde(rename_all = "camelCase")]
    ProcessWebhook { raw_payload: Value },
}

impl JobOperation {
    pub fn name(&self) -> &'static str {
        match self {
            JobOperation::CreatePayment(_) => "createPayment",
            JobOperation::ProcessWebhook { .. } => "processWebhook",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        })
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::error::PaygateError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(crate::error::PaygateError::Queue(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

/// Exponential backoff, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0 for the first retry):
    /// `min(base * 2^retry, max)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u64.saturating_pow(retry);
        Duration::from_millis(
            self.base_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(retry: &RetryConfig) -> Self {
        Self {
            base_delay_ms: retry.base_delay_ms,
            max_delay_ms: retry.max_delay_ms,
        }
    }
}

/// A durable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub operation: JobOperation,
    pub tenant_id: String,
    /// Attempts started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(
        operation: JobOperation,
        tenant_id: impl Into<String>,
        retry: &RetryConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation,
            tenant_id: tenant_id.into(),
            attempts: 0,
            max_attempts: retry.max_attempts.max(1),
            backoff: BackoffPolicy::from(retry),
            status: JobStatus::Pending,
            last_error: None,
            result: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Delay before the next attempt after `attempts` failures.
    pub fn next_delay(&self) -> Duration {
        self.backoff.delay_for(self.attempts.saturating_sub(1))
    }

    /// The operation payload with card data, tokens and documents masked.
    pub fn sanitized_payload(&self) -> Value {
        serde_json::to_value(&self.operation)
            .map(|v| pci::sanitize(&v))
            .unwrap_or(Value::Null)
    }

    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id.clone(),
            operation: self.operation.name().to_string(),
        }
    }
}

/// Returned to callers on enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobHandle {
    pub id: String,
    pub operation: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::BillingType;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn create_payment_op() -> JobOperation {
        JobOperation::CreatePayment(CreatePaymentJob {
            agreement_id: "agr_1".into(),
            params: CreatePaymentParams {
                customer: "cus_1".into(),
                billing_type: BillingType::Pix,
                value: dec!(150.00),
                due_date: "2026-11-01".into(),
                description: None,
                external_reference: Some("agreement_42".into()),
                installment_count: None,
                installment_value: None,
            },
        })
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = BackoffPolicy {
            base_delay_ms: 1_000,
            max_delay_ms: 5_000,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(5_000));
        assert_eq!(policy.delay_for(200), Duration::from_millis(5_000));
    }

    #[test]
    fn test_create_payment_wire_shape() {
        let job = Job::new(create_payment_op(), "company_a", &RetryConfig::default(), Utc::now());
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["operation"]["type"], "createPayment");
        let payload = &value["operation"]["payload"];
        assert_eq!(payload["agreementId"], "agr_1");
        assert_eq!(payload["billingType"], "PIX");
        assert_eq!(payload["value"], 150.0);
        assert_eq!(payload["externalReference"], "agreement_42");
        assert_eq!(value["tenantId"], "company_a");
        assert_eq!(value["status"], "pending");

        let back: Job = serde_json::from_value(value).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_process_webhook_wire_shape() {
        let op = JobOperation::ProcessWebhook {
            raw_payload: json!({ "event": "PAYMENT_RECEIVED" }),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "processWebhook");
        assert_eq!(value["payload"]["rawPayload"]["event"], "PAYMENT_RECEIVED");
    }

    #[test]
    fn test_job_retry_budget() {
        let retry = RetryConfig {
            max_attempts: 2,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        let mut job = Job::new(create_payment_op(), "t", &retry, Utc::now());
        job.attempts = 1;
        assert!(job.can_retry());
        assert_eq!(job.next_delay(), Duration::from_millis(100));
        job.attempts = 2;
        assert!(!job.can_retry());
        assert_eq!(job.next_delay(), Duration::from_millis(200));
    }

    #[test]
    fn test_sanitized_payload_masks_tokens() {
        let job = Job::new(
            JobOperation::ProcessWebhook {
                raw_payload: json!({ "payment": { "id": "p", "cpfCnpj": "12345678901" }, "token": "x" }),
            },
            "t",
            &RetryConfig::default(),
            Utc::now(),
        );
        let payload = job.sanitized_payload();
        assert_eq!(payload["payload"]["rawPayload"]["token"], pci::REDACTED);
        assert_eq!(
            payload["payload"]["rawPayload"]["payment"]["cpfCnpj"],
            "123******01"
        );
    }

    #[test]
    fn test_job_status_parse() {
        assert_eq!("FAILED".parse::<JobStatus>().unwrap(), JobStatus::Failed);
        assert!("done".parse::<JobStatus>().is_err());
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
