//! Logging initialization for Paygate.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output for local debugging
//! - `component`: `[timestamp] [LEVEL] target message {fields}`, compact and grep-friendly;
//!   use the [`log_component!`] macro to add a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators
//!
//! Payloads must go through [`crate::security::pci::sanitize`] before they are
//! attached to any event.

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// Falls back to `RUST_LOG` env var; if unset, uses `cfg.level`.
/// A second call is a no-op.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let installed = match (&cfg.format, &cfg.file) {
        (LogFormat::Json, Some(path)) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
        }
        (LogFormat::Json, None) => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        (LogFormat::Pretty, _) => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .try_init(),
        // Component-tagged events are emitted via the `log_component!` macro
        // which adds a structured `component` field.
        (LogFormat::Component, _) => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init(),
    };

    if let Err(e) = installed {
        // Already installed by an earlier call (tests, embedded use).
        tracing::debug!(error = %e, "tracing subscriber already initialized");
    }
    Ok(())
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`).
/// The `component` field makes it easy to grep logs by subsystem:
///
/// ```
/// # use paygate::log_component;
/// log_component!(info, "webhook", "event enqueued");
/// log_component!(warn, "queue", "job retry scheduled", attempt = 2u32, max_attempts = 5u32);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaygateError;

    #[test]
    fn test_default_logging_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Component);
        assert_eq!(cfg.level, "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_log_format_deserialize_json() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
    }

    #[test]
    fn test_log_format_partial_config_uses_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"trace"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Component);
        assert!(cfg.file.is_none());
        assert_eq!(cfg.level, "trace");
    }

    #[test]
    fn test_init_logging_twice_is_harmless() {
        let cfg = LoggingConfig::default();
        assert!(init_logging(&cfg).is_ok());
        assert!(init_logging(&cfg).is_ok());
    }

    #[test]
    fn test_init_logging_bad_file_path_errors() {
        let cfg = LoggingConfig {
            format: LogFormat::Json,
            level: "info".into(),
            file: Some("/nonexistent-dir/definitely/missing/paygate.log".into()),
        };
        assert!(matches!(init_logging(&cfg), Err(PaygateError::Io(_))));
    }
}
