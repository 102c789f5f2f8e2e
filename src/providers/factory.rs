//! Provider selection from configuration.

use std::sync::Arc;

use super::asaas::AsaasAdapter;
use super::custom::CustomGateway;
use super::simulator::TestModeSimulator;
use super::types::PaymentProvider;
use crate::config::{CustomMode, ProviderKind, ProviderSettings};
use crate::error::Result;
use crate::utils::clock::Clock;

/// The configured provider, plus the simulator when running in test mode.
pub struct ResolvedProvider {
    pub provider: Arc<dyn PaymentProvider>,
    pub simulator: Option<Arc<TestModeSimulator>>,
}

impl ResolvedProvider {
    pub fn is_test_mode(&self) -> bool {
        self.simulator.is_some()
    }
}

fn test_gateway(mode: CustomMode, clock: Arc<dyn Clock>) -> Result<ResolvedProvider> {
    let simulator = Arc::new(TestModeSimulator::new(clock));
    let gateway = CustomGateway::new(mode, Arc::clone(&simulator))?;
    Ok(ResolvedProvider {
        provider: Arc::new(gateway),
        simulator: Some(simulator),
    })
}

/// Build the provider named by `settings.kind`.
///
/// `asaas` without an API key falls back to the test gateway; `custom` in
/// production mode is refused.
pub fn create_provider(
    settings: &ProviderSettings,
    clock: Arc<dyn Clock>,
) -> Result<ResolvedProvider> {
    match settings.kind {
        ProviderKind::Asaas => match settings
            .asaas
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
        {
            Some(key) => {
                let adapter = AsaasAdapter::new(key, &settings.asaas)?;
                tracing::info!(provider = "asaas", "payment provider ready");
                Ok(ResolvedProvider {
                    provider: Arc::new(adapter),
                    simulator: None,
                })
            }
            None => {
                tracing::warn!(
                    "provider.asaas.api_key not configured; using the test-mode gateway"
                );
                test_gateway(CustomMode::Test, clock)
            }
        },
        ProviderKind::Custom => {
            let resolved = test_gateway(settings.custom_mode, clock)?;
            tracing::info!(provider = "custom", "test-mode payment provider ready");
            Ok(resolved)
        }
    }
}
