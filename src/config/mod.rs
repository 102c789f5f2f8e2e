//! Configuration management for Paygate
//!
//! Configuration is loaded from `~/.paygate/config.json` (or an explicit path)
//! with environment variable overrides, then validated.

mod types;
pub mod validate;

pub use types::*;

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{PaygateError, Result};
use crate::security::pci::{self, REDACTED};
use validate::DiagnosticLevel;

impl Config {
    /// Returns the Paygate configuration directory path (~/.paygate)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".paygate")
    }

    /// Returns the path to the config file (~/.paygate/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables follow the pattern: PAYGATE_SECTION_SUBSECTION_KEY
    fn apply_env_overrides(&mut self) {
        // Provider
        if let Some(kind) = env_enum("PAYGATE_PROVIDER_KIND") {
            self.provider.kind = kind;
        }
        if let Some(mode) = env_enum("PAYGATE_PROVIDER_CUSTOM_MODE") {
            self.provider.custom_mode = mode;
        }
        if let Ok(val) = std::env::var("PAYGATE_PROVIDER_ASAAS_API_KEY") {
            self.provider.asaas.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("PAYGATE_PROVIDER_ASAAS_API_URL") {
            self.provider.asaas.api_url = val;
        }
        if let Some(v) = env_parse("PAYGATE_PROVIDER_ASAAS_TIMEOUT_SECS") {
            self.provider.asaas.timeout_secs = v;
        }

        // Queue
        if let Some(v) = env_parse("PAYGATE_QUEUE_CONCURRENCY") {
            self.queue.concurrency = v;
        }
        if let Ok(val) = std::env::var("PAYGATE_QUEUE_STORE_PATH") {
            self.queue.store_path = Some(val);
        }
        if let Some(v) = env_parse("PAYGATE_QUEUE_JOB_TIMEOUT_SECS") {
            self.queue.job_timeout_secs = v;
        }

        // Security
        if let Ok(val) = std::env::var("PAYGATE_SECURITY_ENCRYPTION_KEY") {
            self.security.encryption_key = Some(val);
        }
        if let Some(v) = env_parse("PAYGATE_SECURITY_RATE_LIMIT_MAX_REQUESTS") {
            self.security.rate_limit.max_requests = v;
        }
        if let Some(v) = env_parse("PAYGATE_SECURITY_RATE_LIMIT_WINDOW_MS") {
            self.security.rate_limit.window_ms = v;
        }
        if let Some(v) = env_parse("PAYGATE_SECURITY_OUTBOUND_RATE_LIMIT_MAX_REQUESTS") {
            self.security.outbound_rate_limit.max_requests = v;
        }
        if let Some(v) = env_parse("PAYGATE_SECURITY_OUTBOUND_RATE_LIMIT_WINDOW_MS") {
            self.security.outbound_rate_limit.window_ms = v;
        }

        // Webhook
        if let Ok(val) = std::env::var("PAYGATE_WEBHOOK_ACCESS_TOKEN") {
            self.webhook.access_token = Some(val);
        }

        // Logging
        if let Some(format) = env_enum("PAYGATE_LOGGING_FORMAT") {
            self.logging.format = format;
        }
        if let Ok(val) = std::env::var("PAYGATE_LOGGING_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PAYGATE_LOGGING_FILE") {
            self.logging.file = Some(val);
        }
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations that cannot run.
    pub fn validate(&self) -> Result<()> {
        let errors: Vec<String> = validate::check_values(self)
            .into_iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .map(|d| d.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(PaygateError::Config(errors.join("; ")))
        }
    }

    /// Resolved job store file.
    pub fn job_store_path(&self) -> PathBuf {
        match self.queue.store_path.as_deref() {
            Some(path) if !path.is_empty() => expand_home(path),
            _ => Self::dir().join("jobs.json"),
        }
    }

    /// The configuration as JSON with every secret replaced.
    pub fn redacted(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        for pointer in [
            "/security/encryption_key",
            "/provider/asaas/api_key",
            "/webhook/access_token",
        ] {
            if let Some(slot) = value.pointer_mut(pointer) {
                if !slot.is_null() {
                    *slot = Value::String(REDACTED.to_string());
                }
            }
        }
        Ok(pci::sanitize(&value))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse a lowercase enum value through its serde spelling.
fn env_enum<T: DeserializeOwned>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase())).ok()
}

/// Expand ~ to home directory in a path string
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.provider.kind, ProviderKind::Asaas);
        assert_eq!(config.provider.custom_mode, CustomMode::Test);
        assert_eq!(config.provider.asaas.api_url, "https://api.asaas.com/v3");
        assert_eq!(config.queue.concurrency, 5);
        assert_eq!(config.queue.create_payment.max_attempts, 3);
        assert_eq!(config.queue.create_payment.base_delay_ms, 1_000);
        assert_eq!(config.queue.process_webhook.max_attempts, 5);
        assert_eq!(config.queue.process_webhook.base_delay_ms, 2_000);
        assert_eq!(config.queue.retain_completed, 1_000);
        assert_eq!(config.queue.retain_failed, 5_000);
        assert_eq!(config.security.rate_limit.max_requests, 100);
        assert_eq!(config.security.rate_limit.window_ms, 60_000);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{ "provider": { "kind": "custom" }, "queue": { "concurrency": 2 } }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.provider.kind, ProviderKind::Custom);
        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.queue.job_timeout_secs, 30);
        assert_eq!(config.webhook.dedup_ttl_secs, 86_400);
    }

    #[test]
    fn test_env_override() {
        env::set_var("PAYGATE_PROVIDER_KIND", "CUSTOM");
        env::set_var("PAYGATE_QUEUE_CONCURRENCY", "9");
        env::set_var("PAYGATE_SECURITY_RATE_LIMIT_WINDOW_MS", "1000");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.provider.kind, ProviderKind::Custom);
        assert_eq!(config.queue.concurrency, 9);
        assert_eq!(config.security.rate_limit.window_ms, 1_000);

        env::remove_var("PAYGATE_PROVIDER_KIND");
        env::remove_var("PAYGATE_QUEUE_CONCURRENCY");
        env::remove_var("PAYGATE_SECURITY_RATE_LIMIT_WINDOW_MS");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.queue.retain_failed = 42;
        config.webhook.access_token = Some("whsec".into());
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.queue.retain_failed, 42);
        assert_eq!(loaded.webhook.access_token.as_deref(), Some("whsec"));
    }

    #[test]
    fn test_load_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.json")).unwrap();
        assert_eq!(config.queue.retain_completed, 1_000);
    }

    #[test]
    fn test_validate_rejects_production_custom_gateway() {
        let mut config = Config::default();
        config.provider.kind = ProviderKind::Custom;
        config.provider.custom_mode = CustomMode::Production;
        assert!(matches!(config.validate(), Err(PaygateError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_key_and_zero_concurrency() {
        let mut config = Config::default();
        config.security.encryption_key = Some("abc".into());
        config.queue.concurrency = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("security.encryption_key"));
        assert!(err.contains("queue.concurrency"));
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let mut config = Config::default();
        config.security.encryption_key = Some("00".repeat(32));
        config.provider.asaas.api_key = Some("$aact_live".into());
        config.webhook.access_token = Some("tok".into());
        let value = config.redacted().unwrap();
        let text = value.to_string();
        assert!(!text.contains("$aact_live"));
        assert_eq!(value["webhook"]["access_token"], REDACTED);
        assert_eq!(value["security"]["encryption_key"], REDACTED);
        assert_eq!(value["provider"]["asaas"]["api_key"], REDACTED);
    }

    #[test]
    fn test_job_store_path() {
        let mut config = Config::default();
        assert!(config.job_store_path().ends_with(".paygate/jobs.json"));
        config.queue.store_path = Some("/var/lib/paygate/jobs.json".into());
        assert_eq!(
            config.job_store_path(),
            PathBuf::from("/var/lib/paygate/jobs.json")
        );
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs"), PathBuf::from("/abs"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x"), home.join("x"));
        }
    }
}
