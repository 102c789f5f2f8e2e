//! `PaymentProvider` over the in-memory simulator.

use async_trait::async_trait;
use std::sync::Arc;

use super::simulator::TestModeSimulator;
use super::types::{
    CreateCustomerParams, CreatePaymentParams, PaymentProvider, ProviderCustomer, ProviderPayment,
    RefundParams,
};
use crate::config::CustomMode;
use crate::error::{PaygateError, Result};

/// Test-mode gateway. Refuses to exist in production mode.
pub struct CustomGateway {
    simulator: Arc<TestModeSimulator>,
}

impl CustomGateway {
    pub fn new(mode: CustomMode, simulator: Arc<TestModeSimulator>) -> Result<Self> {
        if mode == CustomMode::Production {
            return Err(PaygateError::ProductionBlocked);
        }
        Ok(Self { simulator })
    }

    /// The backing simulator, for driving payment lifecycles in tests.
    pub fn simulator(&self) -> Arc<TestModeSimulator> {
        Arc::clone(&self.simulator)
    }
}

#[async_trait]
impl PaymentProvider for CustomGateway {
    fn name(&self) -> &str {
        "custom"
    }

    async fn create_customer(&self, params: &CreateCustomerParams) -> Result<ProviderCustomer> {
        Ok(self.simulator.create_customer(params))
    }

    async fn get_customer_by_cpf_cnpj(&self, cpf_cnpj: &str) -> Result<Option<ProviderCustomer>> {
        Ok(self.simulator.get_customer_by_cpf_cnpj(cpf_cnpj))
    }

    async fn create_payment(
        &self,
        params: &CreatePaymentParams,
        idempotency_key: Option<&str>,
    ) -> Result<ProviderPayment> {
        Ok(self.simulator.create_payment(params, idempotency_key))
    }

    async fn get_payment(&self, payment_id: &str) -> Result<ProviderPayment> {
        self.simulator
            .get_payment(payment_id)
            .ok_or_else(|| PaygateError::NotFound(format!("payment {}", payment_id)))
    }

    async fn get_payment_by_external_reference(
        &self,
        external_reference: &str,
    ) -> Result<Option<ProviderPayment>> {
        Ok(self
            .simulator
            .get_payment_by_external_reference(external_reference))
    }

    async fn refund_payment(&self, params: &RefundParams) -> Result<ProviderPayment> {
        self.simulator.simulate_refund(&params.payment_id)
    }

    async fn cancel_payment(&self, payment_id: &str) -> Result<()> {
        self.simulator.cancel_payment(payment_id).map(|_| ())
    }
}
