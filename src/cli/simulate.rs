//! End-to-end run against the test-mode gateway with in-memory stores.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use paygate::config::{Config, ProviderKind};
use paygate::payments::MemoryTransactionLog;
use paygate::providers::{BillingType, CreateCustomerParams, CreatePaymentParams, WebhookEventType};
use paygate::queue::{CreatePaymentJob, Job, JobOperation, JobQueue, MemoryJobStore};
use paygate::store::{Agreement, Debt, DebtStatus, InMemoryAgreementStore, RecordingNotifier};
use paygate::utils::Clock;
use paygate::webhook::{external_reference_for, IngressOutcome};
use paygate::Paygate;

const TENANT: &str = "demo_company";

fn events_until(until: &str) -> Result<Vec<WebhookEventType>> {
    use WebhookEventType::*;
    Ok(match until {
        "confirmed" => vec![PaymentConfirmed],
        "received" => vec![PaymentConfirmed, PaymentReceived],
        "overdue" => vec![PaymentOverdue],
        "refunded" => vec![PaymentConfirmed, PaymentReceived, PaymentRefunded],
        other => bail!(
            "unknown stage '{}' (expected confirmed, received, overdue or refunded)",
            other
        ),
    })
}

async fn wait_for(queue: &JobQueue, id: &str) -> Result<Job> {
    for _ in 0..500 {
        if let Some(job) = queue.get(id).await? {
            if job.status.is_terminal() {
                return Ok(job);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("job {} did not finish", id)
}

pub(crate) async fn cmd_simulate(amount: &str, until: &str) -> Result<()> {
    let amount = Decimal::from_str(amount).context("Invalid amount")?;
    let events = events_until(until)?;

    let mut config = Config::default();
    config.provider.kind = ProviderKind::Custom;

    let agreements = Arc::new(InMemoryAgreementStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let transactions = Arc::new(MemoryTransactionLog::new());
    let app = Paygate::builder(config)
        .job_store(Arc::new(MemoryJobStore::new()))
        .agreement_store(agreements.clone())
        .notifier(notifier.clone())
        .transaction_sink(transactions.clone())
        .build()
        .await?;
    let Some(simulator) = app.simulator().cloned() else {
        bail!("test-mode gateway unavailable");
    };
    let pool = app.start().await?;

    agreements.insert_debt(Debt {
        id: "debt_42".into(),
        external_id: Some("42".into()),
        status: DebtStatus::Open,
    });
    let mut agreement = Agreement::new("agr_42", TENANT, "debt_42", amount, app.clock.now());
    agreement.user_id = Some("user_1".into());
    agreements.insert_agreement(agreement);

    let customer = app
        .payments
        .create_customer(
            &CreateCustomerParams {
                name: "Cliente Demo".into(),
                cpf_cnpj: "12345678909".into(),
                email: Some("demo@example.com".into()),
                ..Default::default()
            },
            Some(TENANT),
        )
        .await?;
    println!("Customer   {}", customer.id);

    let handle = app
        .queue
        .enqueue(
            JobOperation::CreatePayment(CreatePaymentJob {
                agreement_id: "agr_42".into(),
                params: CreatePaymentParams {
                    customer: customer.id.clone(),
                    billing_type: BillingType::Pix,
                    value: amount,
                    due_date: (app.clock.now() + chrono::Duration::days(3))
                        .format("%Y-%m-%d")
                        .to_string(),
                    description: Some("Acordo de pagamento".into()),
                    external_reference: Some(external_reference_for("42")),
                    installment_count: None,
                    installment_value: None,
                },
            }),
            TENANT,
        )
        .await?;
    let job = wait_for(&app.queue, &handle.id).await?;
    let Some(payment_id) = job
        .result
        .as_ref()
        .and_then(|r| r["paymentId"].as_str())
        .map(str::to_string)
    else {
        bail!(
            "payment creation failed: {}",
            job.last_error.unwrap_or_default()
        );
    };
    println!("Payment    {} (job {})", payment_id, job.id);

    for event in events {
        match event {
            WebhookEventType::PaymentConfirmed => simulator.simulate_payment_confirmation(&payment_id)?,
            WebhookEventType::PaymentReceived => simulator.simulate_payment_received(&payment_id)?,
            WebhookEventType::PaymentOverdue => simulator.simulate_payment_overdue(&payment_id)?,
            WebhookEventType::PaymentRefunded => simulator.simulate_refund(&payment_id)?,
            _ => continue,
        };
        let body = serde_json::to_vec(&simulator.webhook_payload(&payment_id, event)?)?;
        let IngressOutcome::Enqueued(handle) = app.ingress.receive(TENANT, None, &body).await?
        else {
            continue;
        };
        let job = wait_for(&app.queue, &handle.id).await?;
        let current = agreements
            .agreement("agr_42")
            .context("agreement disappeared")?;
        println!(
            "{:<18} job {:<9}  payment {:<9}  agreement {}",
            event.to_string(),
            job.status.to_string(),
            current.payment_status.to_string(),
            current.status
        );
    }

    if let Some(debt) = agreements.debt("debt_42") {
        println!("Debt       {} is {}", debt.id, debt.status);
    }
    for notification in notifier.sent() {
        println!("Notify     {}: {}", notification.title, notification.description);
    }
    println!("Gateway calls logged: {}", transactions.entries().len());

    pool.shutdown().await;
    Ok(())
}
