//! Wiring of the full payment pipeline from a [`Config`].
//!
//! The host application supplies the agreement store and notifier (its
//! database and messaging); everything else is built here.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::log_component;
use crate::payments::{PaymentService, TransactionLogSink};
use crate::providers::{create_provider, ResolvedProvider, TestModeSimulator};
use crate::queue::{FileJobStore, JobQueue, JobStore, PaymentJobHandler, WorkerPool};
use crate::security::rate_limit::TenantRateLimiter;
use crate::store::{AgreementStore, InMemoryAgreementStore, Notifier, TracingNotifier};
use crate::utils::clock::{Clock, SystemClock};
use crate::webhook::{EventDeduplicator, WebhookIngress, WebhookProcessor};

pub struct PaygateBuilder {
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    job_store: Option<Arc<dyn JobStore>>,
    agreements: Option<Arc<dyn AgreementStore>>,
    notifier: Option<Arc<dyn Notifier>>,
    transaction_sink: Option<Arc<dyn TransactionLogSink>>,
}

impl PaygateBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`FileJobStore`] at [`Config::job_store_path`].
    pub fn job_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.job_store = Some(store);
        self
    }

    /// Defaults to an empty [`InMemoryAgreementStore`].
    pub fn agreement_store(mut self, store: Arc<dyn AgreementStore>) -> Self {
        self.agreements = Some(store);
        self
    }

    /// Defaults to [`TracingNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn transaction_sink(mut self, sink: Arc<dyn TransactionLogSink>) -> Self {
        self.transaction_sink = Some(sink);
        self
    }

    pub async fn build(self) -> Result<Paygate> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let provider = create_provider(&config.provider, clock.clone())?;
        let limiter = Arc::new(TenantRateLimiter::new(
            config.security.rate_limit,
            config.security.outbound_rate_limit,
            clock.clone(),
        ));

        let mut payments = PaymentService::new(provider.provider.clone(), clock.clone())
            .with_rate_limiter(limiter.clone());
        if let Some(sink) = self.transaction_sink {
            payments = payments.with_sink(sink);
        }
        let payments = Arc::new(payments);

        let agreements = self
            .agreements
            .unwrap_or_else(|| Arc::new(InMemoryAgreementStore::new()));
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));
        let processor = Arc::new(WebhookProcessor::new(
            provider.provider.clone(),
            agreements.clone(),
            notifier,
            clock.clone(),
        ));

        let job_store: Arc<dyn JobStore> = match self.job_store {
            Some(store) => store,
            None => Arc::new(FileJobStore::open(config.job_store_path()).await?),
        };
        let queue = Arc::new(JobQueue::new(job_store, config.queue.clone(), clock.clone()));

        let dedup = Arc::new(EventDeduplicator::new(
            config.webhook.dedup_ttl_secs,
            config.webhook.dedup_max_entries,
            clock.clone(),
        ));
        let ingress = WebhookIngress::new(
            config.webhook.access_token.clone(),
            limiter.clone(),
            dedup,
            queue.clone(),
        );

        log_component!(
            info,
            "paygate",
            "Payment pipeline ready",
            provider = provider.provider.name(),
            test_mode = provider.is_test_mode(),
            workers = config.queue.concurrency
        );

        Ok(Paygate {
            config,
            clock,
            provider,
            limiter,
            payments,
            agreements,
            processor,
            queue,
            ingress,
        })
    }
}

/// A wired payment pipeline.
///
/// ```
/// use std::sync::Arc;
/// use paygate::config::{Config, ProviderKind};
/// use paygate::queue::MemoryJobStore;
/// use paygate::webhook::IngressOutcome;
/// use paygate::Paygate;
///
/// # tokio_test::block_on(async {
/// let mut config = Config::default();
/// config.provider.kind = ProviderKind::Custom;
/// let app = Paygate::builder(config)
///     .job_store(Arc::new(MemoryJobStore::new()))
///     .build()
///     .await
///     .unwrap();
///
/// let body = br#"{"event":"PAYMENT_RECEIVED","payment":{"id":"pay_1"}}"#;
/// let outcome = app.ingress.receive("company_a", None, body).await.unwrap();
/// assert!(matches!(outcome, IngressOutcome::Enqueued(_)));
/// # });
/// ```
pub struct Paygate {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub provider: ResolvedProvider,
    pub limiter: Arc<TenantRateLimiter>,
    pub payments: Arc<PaymentService>,
    pub agreements: Arc<dyn AgreementStore>,
    pub processor: Arc<WebhookProcessor>,
    pub queue: Arc<JobQueue>,
    pub ingress: WebhookIngress,
}

impl Paygate {
    pub fn builder(config: Config) -> PaygateBuilder {
        PaygateBuilder {
            config,
            clock: None,
            job_store: None,
            agreements: None,
            notifier: None,
            transaction_sink: None,
        }
    }

    /// The test-mode gateway, when no real gateway is configured.
    pub fn simulator(&self) -> Option<&Arc<TestModeSimulator>> {
        self.provider.simulator.as_ref()
    }

    /// Re-dispatch unfinished jobs and start the worker pool.
    pub async fn start(&self) -> Result<WorkerPool> {
        self.queue.recover().await?;
        let handler = Arc::new(PaymentJobHandler::new(
            self.payments.clone(),
            self.agreements.clone(),
            self.processor.clone(),
        ));
        Ok(WorkerPool::start(
            self.queue.clone(),
            handler,
            self.config.queue.concurrency,
        ))
    }
}
