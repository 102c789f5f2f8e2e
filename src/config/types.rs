//! Configuration type definitions for Paygate
//!
//! All types implement serde traits for JSON serialization and have sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration struct for Paygate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which payment gateway to talk to
    pub provider: ProviderSettings,
    /// Job queue and worker pool
    pub queue: QueueConfig,
    /// Encryption key and rate limits
    pub security: SecurityConfig,
    /// Webhook ingress
    pub webhook: WebhookConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Provider Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Asaas,
    Custom,
}

/// Operating mode of the test-mode gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomMode {
    #[default]
    Test,
    Production,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub custom_mode: CustomMode,
    pub asaas: AsaasConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsaasConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for AsaasConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: crate::providers::asaas::ASAAS_API_BASE.to_string(),
            timeout_secs: 30,
        }
    }
}

// ============================================================================
// Queue Configuration
// ============================================================================

/// Attempt budget and exponential backoff for one operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of workers.
    pub concurrency: usize,
    /// Job store file; `~/.paygate/jobs.json` when unset.
    pub store_path: Option<String>,
    /// Deadline for a single job attempt.
    pub job_timeout_secs: u64,
    pub retain_completed: usize,
    pub retain_failed: usize,
    pub create_payment: RetryConfig,
    pub process_webhook: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            store_path: None,
            job_timeout_secs: 30,
            retain_completed: 1_000,
            retain_failed: 5_000,
            create_payment: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 1_000,
                max_delay_ms: 60_000,
            },
            process_webhook: RetryConfig {
                max_attempts: 5,
                base_delay_ms: 2_000,
                max_delay_ms: 120_000,
            },
        }
    }
}

// ============================================================================
// Security Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 64 hex chars. Required for encrypting fields at rest.
    pub encryption_key: Option<String>,
    /// Per-tenant webhook ingress limit.
    pub rate_limit: RateLimitConfig,
    /// Per-tenant limit on outbound gateway calls.
    pub outbound_rate_limit: RateLimitConfig,
}

// ============================================================================
// Webhook Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared token the gateway sends with every webhook. Unchecked when unset.
    pub access_token: Option<String>,
    pub dedup_ttl_secs: u64,
    pub dedup_max_entries: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            dedup_ttl_secs: 86_400,
            dedup_max_entries: 10_000,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human-readable output.
    Pretty,
    /// Compact single-line output with component tags.
    #[default]
    Component,
    /// JSON lines.
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Append JSON logs to this file instead of stdout.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Component,
            level: "info".to_string(),
            file: None,
        }
    }
}
