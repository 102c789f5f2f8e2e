//! Asaas REST adapter.
//!
//! Talks to `https://api.asaas.com/v3` (configurable) with the `access_token`
//! header. HTTP failures are classified into [`GatewayError`] so the job queue
//! can tell transient from permanent errors. No inline retry: a retryable
//! error surfaces to the queue, which owns backoff.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::normalize::map_status;
use super::types::{
    BillingType, CreateCustomerParams, CreatePaymentParams, PaymentProvider, ProviderCustomer,
    ProviderPayment, RefundParams,
};
use crate::config::AsaasConfig;
use crate::error::{GatewayError, PaygateError, Result};

/// Default API base URL.
pub const ASAAS_API_BASE: &str = "https://api.asaas.com/v3";

/// Payment as returned by Asaas.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AsaasPayment {
    id: String,
    customer: String,
    billing_type: BillingType,
    #[serde(with = "rust_decimal::serde::float")]
    value: Decimal,
    due_date: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    external_reference: Option<String>,
    #[serde(default)]
    installment_count: Option<u32>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    installment_value: Option<Decimal>,
    #[serde(default)]
    invoice_url: Option<String>,
    #[serde(default)]
    bank_slip_url: Option<String>,
    #[serde(default)]
    transaction_receipt_url: Option<String>,
    #[serde(default)]
    pix_qr_code_url: Option<String>,
    status: String,
}

impl From<AsaasPayment> for ProviderPayment {
    fn from(p: AsaasPayment) -> Self {
        ProviderPayment {
            status: map_status(&p.status),
            id: p.id,
            customer_id: p.customer,
            billing_type: p.billing_type,
            value: p.value,
            due_date: p.due_date,
            description: p.description,
            external_reference: p.external_reference,
            installment_count: p.installment_count,
            installment_value: p.installment_value,
            payment_url: p.invoice_url,
            boleto_url: p.bank_slip_url,
            pix_qr_code_url: p.pix_qr_code_url,
            transaction_receipt_url: p.transaction_receipt_url,
        }
    }
}

/// Paged list envelope (`{ "data": [...] }`).
#[derive(Debug, Deserialize)]
struct AsaasList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AsaasRefundBody<'a> {
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    value: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

/// Pull the human message out of an Asaas error body
/// (`{"errors":[{"code":"...","description":"..."}]}`).
fn error_description(body: &Value) -> Option<String> {
    body.get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first())
        .and_then(|e| e.get("description"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn classify_send_error(err: reqwest::Error) -> PaygateError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string()).into()
    } else if err.is_connect() {
        GatewayError::ServerError(format!("connection failed: {}", err)).into()
    } else {
        PaygateError::Http(err)
    }
}

pub struct AsaasAdapter {
    api_key: String,
    base_url: String,
    client: Client,
}

impl AsaasAdapter {
    pub fn new(api_key: &str, config: &AsaasConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("access_token", &self.api_key)
            .header("Content-Type", "application/json")
    }

    /// Send and decode. Non-2xx statuses become classified gateway errors.
    async fn send(&self, builder: RequestBuilder) -> Result<Value> {
        let resp = builder.send().await.map_err(classify_send_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(classify_send_error)?;
        let body: Value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            let message =
                error_description(&body).unwrap_or_else(|| format!("Asaas API error ({})", status));
            tracing::warn!(status = status.as_u16(), error = %message, "Asaas API call failed");
            return Err(GatewayError::from_status(status.as_u16(), message).into());
        }
        Ok(body)
    }

    async fn send_as<T: serde::de::DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let body = self.send(builder).await?;
        serde_json::from_value(body).map_err(|e| {
            GatewayError::Unknown(format!("unexpected Asaas response shape: {}", e)).into()
        })
    }
}

#[async_trait]
impl PaymentProvider for AsaasAdapter {
    fn name(&self) -> &str {
        "asaas"
    }

    async fn create_customer(&self, params: &CreateCustomerParams) -> Result<ProviderCustomer> {
        self.send_as(self.request(Method::POST, "/customers").json(params))
            .await
    }

    async fn get_customer_by_cpf_cnpj(&self, cpf_cnpj: &str) -> Result<Option<ProviderCustomer>> {
        let list: AsaasList<ProviderCustomer> = self
            .send_as(
                self.request(Method::GET, "/customers")
                    .query(&[("cpfCnpj", cpf_cnpj)]),
            )
            .await?;
        Ok(list.data.into_iter().next())
    }

    async fn create_payment(
        &self,
        params: &CreatePaymentParams,
        idempotency_key: Option<&str>,
    ) -> Result<ProviderPayment> {
        let mut builder = self.request(Method::POST, "/payments").json(params);
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        let payment: AsaasPayment = self.send_as(builder).await?;
        Ok(payment.into())
    }

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment> {
        let payment: AsaasPayment = self
            .send_as(self.request(Method::GET, &format!("/payments/{}", payment_id)))
            .await?;
        Ok(payment.into())
    }

    async fn get_payment_by_external_reference(
        &self,
        external_reference: &str,
    ) -> Result<Option<ProviderPayment>> {
        let list: AsaasList<AsaasPayment> = self
            .send_as(
                self.request(Method::GET, "/payments")
                    .query(&[("externalReference", external_reference)]),
            )
            .await?;
        Ok(list.data.into_iter().next().map(ProviderPayment::from))
    }

    async fn refund_payment(&self, params: &RefundParams) -> Result<ProviderPayment> {
        let body = AsaasRefundBody {
            value: params.value,
            description: params.description.as_deref(),
        };
        let payment: AsaasPayment = self
            .send_as(
                self.request(
                    Method::POST,
                    &format!("/payments/{}/refund", params.payment_id),
                )
                .json(&body),
            )
            .await?;
        Ok(payment.into())
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &format!("/payments/{}", payment_id)))
            .await
            .map(|_| ())
    }
}
