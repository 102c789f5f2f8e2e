use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::job::{CreatePaymentJob, Job, JobOperation};
use crate::error::Result;
use crate::payments::PaymentService;
use crate::store::AgreementStore;
use crate::webhook::WebhookProcessor;

/// Executes one attempt of a job. The returned value is stored as the job
/// result; an error is classified by [`PaygateError::is_retryable`].
///
/// [`PaygateError::is_retryable`]: crate::error::PaygateError::is_retryable
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> Result<Value>;
}

/// Dispatches queued payment work to the payment service and the webhook
/// processor.
pub struct PaymentJobHandler {
    payments: Arc<PaymentService>,
    store: Arc<dyn AgreementStore>,
    processor: Arc<WebhookProcessor>,
}

impl PaymentJobHandler {
    pub fn new(
        payments: Arc<PaymentService>,
        store: Arc<dyn AgreementStore>,
        processor: Arc<WebhookProcessor>,
    ) -> Self {
        Self {
            payments,
            store,
            processor,
        }
    }

    async fn create_payment(&self, job: &Job, work: &CreatePaymentJob) -> Result<Value> {
        // Same key on every attempt, so a retry after a lost response
        // cannot create a second charge.
        let idempotency_key = format!("job_{}", job.id);
        let payment = self
            .payments
            .create_payment(&work.params, Some(&idempotency_key), Some(&job.tenant_id))
            .await?;
        self.store
            .bind_vendor_payment(
                &work.agreement_id,
                &payment.id,
                Some(payment.customer_id.clone()),
            )
            .await?;
        info!(
            agreement_id = %work.agreement_id,
            payment_id = %payment.id,
            "Payment created for agreement"
        );
        Ok(json!({
            "paymentId": payment.id,
            "status": payment.status,
            "paymentUrl": payment.payment_url,
            "boletoUrl": payment.boleto_url,
            "pixQrCodeUrl": payment.pix_qr_code_url,
        }))
    }
}

#[async_trait]
impl JobHandler for PaymentJobHandler {
    async fn handle(&self, job: &Job) -> Result<Value> {
        match &job.operation {
            JobOperation::CreatePayment(work) => self.create_payment(job, work).await,
            JobOperation::ProcessWebhook { raw_payload } => {
                let outcome = self.processor.process(&job.tenant_id, raw_payload).await?;
                Ok(serde_json::to_value(outcome)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomMode, RetryConfig};
    use crate::providers::{
        BillingType, CreatePaymentParams, CustomGateway, PaymentProvider, TestModeSimulator,
    };
    use crate::store::{Agreement, InMemoryAgreementStore, RecordingNotifier};
    use crate::utils::clock::{Clock, ManualClock};
    use rust_decimal_macros::dec;

    struct Fixture {
        handler: PaymentJobHandler,
        simulator: Arc<TestModeSimulator>,
        store: Arc<InMemoryAgreementStore>,
        clock: Arc<dyn Clock>,
    }

    fn fixture() -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let simulator = Arc::new(TestModeSimulator::new(clock.clone()));
        let provider: Arc<dyn PaymentProvider> =
            Arc::new(CustomGateway::new(CustomMode::Test, simulator.clone()).unwrap());
        let store = Arc::new(InMemoryAgreementStore::new());
        store.insert_agreement(Agreement::new("agr_1", "company_a", "debt_1", dec!(80), clock.now()));

        let payments = Arc::new(PaymentService::new(provider.clone(), clock.clone()));
        let processor = Arc::new(WebhookProcessor::new(
            provider,
            store.clone(),
            Arc::new(RecordingNotifier::new()),
            clock.clone(),
        ));
        Fixture {
            handler: PaymentJobHandler::new(payments, store.clone(), processor),
            simulator,
            store,
            clock,
        }
    }

    fn create_job(clock: &Arc<dyn Clock>) -> Job {
        Job::new(
            JobOperation::CreatePayment(CreatePaymentJob {
                agreement_id: "agr_1".into(),
                params: CreatePaymentParams {
                    customer: "cus_1".into(),
                    billing_type: BillingType::Pix,
                    value: dec!(80),
                    due_date: "2026-11-01".into(),
                    description: Some("Acordo".into()),
                    external_reference: Some("agreement_1".into()),
                    installment_count: None,
                    installment_value: None,
                },
            }),
            "company_a",
            &RetryConfig::default(),
            clock.now(),
        )
    }

    #[tokio::test]
    async fn test_create_payment_binds_agreement() {
        let f = fixture();
        let job = create_job(&f.clock);
        let result = f.handler.handle(&job).await.unwrap();
        let payment_id = result["paymentId"].as_str().unwrap().to_string();

        let agreement = f.store.agreement("agr_1").unwrap();
        assert_eq!(agreement.vendor_payment_id.as_deref(), Some(payment_id.as_str()));
        assert_eq!(agreement.vendor_customer_id.as_deref(), Some("cus_1"));

        // A repeated attempt reuses the same charge.
        let again = f.handler.handle(&job).await.unwrap();
        assert_eq!(again["paymentId"], result["paymentId"]);
        assert_eq!(f.simulator.payment_count(), 1);
    }

    #[tokio::test]
    async fn test_process_webhook_job() {
        let f = fixture();
        let created = f.handler.handle(&create_job(&f.clock)).await.unwrap();
        let payment_id = created["paymentId"].as_str().unwrap();
        f.simulator.simulate_payment_confirmation(payment_id).unwrap();
        let body = f
            .simulator
            .webhook_payload(payment_id, crate::providers::WebhookEventType::PaymentConfirmed)
            .unwrap();

        let job = Job::new(
            JobOperation::ProcessWebhook { raw_payload: body },
            "company_a",
            &RetryConfig::default(),
            f.clock.now(),
        );
        let outcome = f.handler.handle(&job).await.unwrap();
        assert_eq!(outcome["applied"], true);
        assert_eq!(outcome["tier"], "direct");
        assert_eq!(outcome["paymentStatus"], "confirmed");
    }
}
