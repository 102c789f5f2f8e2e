//! Outbound payment operations.
//!
//! [`PaymentService`] sits between callers and a [`PaymentProvider`]. Every
//! call is rate limited per tenant, timed, and recorded as a
//! [`TransactionLog`] with request and response passed through the PCI
//! sanitizer. Log delivery never fails a payment call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;
use crate::providers::{
    CreateCustomerParams, CreatePaymentParams, PaymentProvider, ProviderCustomer, ProviderPayment,
    RefundParams, WebhookEvent,
};
use crate::security::pci;
use crate::security::rate_limit::TenantRateLimiter;
use crate::utils::clock::Clock;

/// One provider call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionLog {
    pub provider: String,
    pub operation: String,
    pub request: Value,
    pub response: Option<Value>,
    pub error: Option<String>,
    pub tenant: Option<String>,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Destination for transaction logs, usually a database table.
#[async_trait]
pub trait TransactionLogSink: Send + Sync {
    async fn record(&self, entry: &TransactionLog) -> Result<()>;
}

/// Keeps transaction logs in memory.
#[derive(Debug, Default)]
pub struct MemoryTransactionLog {
    entries: Mutex<Vec<TransactionLog>>,
}

impl MemoryTransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<TransactionLog> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TransactionLogSink for MemoryTransactionLog {
    async fn record(&self, entry: &TransactionLog) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
        Ok(())
    }
}

pub struct PaymentService {
    provider: Arc<dyn PaymentProvider>,
    limiter: Option<Arc<TenantRateLimiter>>,
    sink: Option<Arc<dyn TransactionLogSink>>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    pub fn new(provider: Arc<dyn PaymentProvider>, clock: Arc<dyn Clock>) -> Self {
        Self {
            provider,
            limiter: None,
            sink: None,
            clock,
        }
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<TenantRateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TransactionLogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn provider(&self) -> &Arc<dyn PaymentProvider> {
        &self.provider
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn create_customer(
        &self,
        params: &CreateCustomerParams,
        tenant: Option<&str>,
    ) -> Result<ProviderCustomer> {
        let request = serde_json::to_value(params)?;
        self.call(
            "createCustomer",
            tenant,
            request,
            self.provider.create_customer(params),
        )
        .await
    }

    pub async fn get_customer_by_cpf_cnpj(
        &self,
        cpf_cnpj: &str,
        tenant: Option<&str>,
    ) -> Result<Option<ProviderCustomer>> {
        self.call(
            "getCustomerByCpfCnpj",
            tenant,
            json!({ "cpfCnpj": cpf_cnpj }),
            self.provider.get_customer_by_cpf_cnpj(cpf_cnpj),
        )
        .await
    }

    pub async fn create_payment(
        &self,
        params: &CreatePaymentParams,
        idempotency_key: Option<&str>,
        tenant: Option<&str>,
    ) -> Result<ProviderPayment> {
        let request = serde_json::to_value(params)?;
        self.call(
            "createPayment",
            tenant,
            request,
            self.provider.create_payment(params, idempotency_key),
        )
        .await
    }

    pub async fn get_payment(&self, payment_id: &str, tenant: Option<&str>) -> Result<ProviderPayment> {
        self.call(
            "getPayment",
            tenant,
            json!({ "paymentId": payment_id }),
            self.provider.get_payment(payment_id),
        )
        .await
    }

    pub async fn get_payment_by_external_reference(
        &self,
        external_reference: &str,
        tenant: Option<&str>,
    ) -> Result<Option<ProviderPayment>> {
        self.call(
            "getPaymentByExternalReference",
            tenant,
            json!({ "externalReference": external_reference }),
            self.provider
                .get_payment_by_external_reference(external_reference),
        )
        .await
    }

    pub async fn refund_payment(
        &self,
        params: &RefundParams,
        tenant: Option<&str>,
    ) -> Result<ProviderPayment> {
        let request = serde_json::to_value(params)?;
        self.call(
            "refundPayment",
            tenant,
            request,
            self.provider.refund_payment(params),
        )
        .await
    }

    pub async fn cancel_payment(&self, payment_id: &str, tenant: Option<&str>) -> Result<()> {
        self.call(
            "cancelPayment",
            tenant,
            json!({ "paymentId": payment_id }),
            self.provider.cancel_payment(payment_id),
        )
        .await
    }

    pub fn parse_webhook(&self, body: &Value) -> Result<WebhookEvent> {
        self.provider.parse_webhook(body)
    }

    async fn call<T, F>(
        &self,
        operation: &'static str,
        tenant: Option<&str>,
        request: Value,
        fut: F,
    ) -> Result<T>
    where
        T: Serialize,
        F: Future<Output = Result<T>>,
    {
        if let (Some(limiter), Some(tenant)) = (&self.limiter, tenant) {
            limiter.check_outbound(tenant)?;
        }

        let started = Instant::now();
        let result = fut.await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (response, error) = match &result {
            Ok(value) => (
                serde_json::to_value(value)
                    .ok()
                    .filter(|v| !v.is_null())
                    .map(|v| pci::sanitize(&v)),
                None,
            ),
            Err(e) => (None, Some(e.to_string())),
        };
        let entry = TransactionLog {
            provider: self.provider.name().to_string(),
            operation: operation.to_string(),
            request: pci::sanitize(&request),
            response,
            error,
            tenant: tenant.map(str::to_string),
            duration_ms,
            created_at: self.clock.now(),
        };
        self.record(&entry).await;
        result
    }

    async fn record(&self, entry: &TransactionLog) {
        match &entry.error {
            Some(error) => warn!(
                provider = %entry.provider,
                operation = %entry.operation,
                duration_ms = entry.duration_ms,
                error = %error,
                request = %entry.request,
                "Provider call failed"
            ),
            None => debug!(
                provider = %entry.provider,
                operation = %entry.operation,
                duration_ms = entry.duration_ms,
                "Provider call succeeded"
            ),
        }
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(entry).await {
                warn!(operation = %entry.operation, error = %e, "Failed to record transaction log");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomMode, RateLimitConfig};
    use crate::error::PaygateError;
    use crate::providers::{BillingType, CustomGateway, TestModeSimulator};
    use crate::utils::clock::ManualClock;
    use rust_decimal_macros::dec;

    struct FailingSink;

    #[async_trait]
    impl TransactionLogSink for FailingSink {
        async fn record(&self, _entry: &TransactionLog) -> Result<()> {
            Err(PaygateError::Store("log table missing".into()))
        }
    }

    fn service(max_outbound: u32) -> (PaymentService, Arc<MemoryTransactionLog>) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let simulator = Arc::new(TestModeSimulator::new(clock.clone()));
        let provider = Arc::new(CustomGateway::new(CustomMode::Test, simulator).unwrap());
        let limiter = Arc::new(TenantRateLimiter::new(
            RateLimitConfig::default(),
            RateLimitConfig {
                max_requests: max_outbound,
                window_ms: 60_000,
            },
            clock.clone(),
        ));
        let log = Arc::new(MemoryTransactionLog::new());
        let service = PaymentService::new(provider, clock)
            .with_rate_limiter(limiter)
            .with_sink(log.clone());
        (service, log)
    }

    fn customer_params() -> CreateCustomerParams {
        CreateCustomerParams {
            name: "Maria".into(),
            cpf_cnpj: "12345678901".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_calls_are_logged_sanitized() {
        let (service, log) = service(10);
        let customer = service
            .create_customer(&customer_params(), Some("company_a"))
            .await
            .unwrap();
        let params = CreatePaymentParams {
            customer: customer.id.clone(),
            billing_type: BillingType::Boleto,
            value: dec!(99.90),
            due_date: "2026-11-01".into(),
            description: None,
            external_reference: Some("agreement_7".into()),
            installment_count: None,
            installment_value: None,
        };
        let payment = service
            .create_payment(&params, Some("job_1"), Some("company_a"))
            .await
            .unwrap();
        assert!(payment.boleto_url.is_some());

        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operation, "createCustomer");
        assert_eq!(entries[0].provider, "custom");
        assert_eq!(entries[0].request["cpfCnpj"], "123******01");
        assert_eq!(entries[0].tenant.as_deref(), Some("company_a"));
        assert_eq!(entries[1].operation, "createPayment");
        assert!(entries[1].response.is_some());
    }

    #[tokio::test]
    async fn test_errors_are_logged_and_returned() {
        let (service, log) = service(10);
        let err = service.get_payment("missing", None).await.unwrap_err();
        assert!(matches!(err, PaygateError::NotFound(_)));
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].error.is_some());
        assert!(entries[0].response.is_none());
    }

    #[tokio::test]
    async fn test_outbound_rate_limit_per_tenant() {
        let (service, log) = service(1);
        service
            .get_customer_by_cpf_cnpj("123", Some("company_a"))
            .await
            .unwrap();
        let err = service
            .get_customer_by_cpf_cnpj("123", Some("company_a"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaygateError::RateLimited { .. }));
        service
            .get_customer_by_cpf_cnpj("123", Some("company_b"))
            .await
            .unwrap();
        assert_eq!(log.entries().len(), 2);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_fail_call() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let simulator = Arc::new(TestModeSimulator::new(clock.clone()));
        let provider = Arc::new(CustomGateway::new(CustomMode::Test, simulator).unwrap());
        let service = PaymentService::new(provider, clock).with_sink(Arc::new(FailingSink));
        assert!(service
            .create_customer(&customer_params(), None)
            .await
            .is_ok());
    }
}
