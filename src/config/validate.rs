//! Configuration validation with unknown field detection.
//!
//! Two passes: [`validate_config`] checks the raw JSON for unknown keys (typos
//! silently fall back to defaults otherwise), [`check_values`] checks the
//! loaded values for combinations that cannot run.

use serde_json::Value;
use std::collections::HashSet;

use crate::config::{Config, CustomMode, ProviderKind};
use crate::security::encryption::FieldCipher;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["provider", "queue", "security", "webhook", "logging"];

/// Known fields for each section.
const KNOWN_SECTIONS: &[(&str, &[&str])] = &[
    ("provider", &["kind", "custom_mode", "asaas"]),
    (
        "queue",
        &[
            "concurrency",
            "store_path",
            "job_timeout_secs",
            "retain_completed",
            "retain_failed",
            "create_payment",
            "process_webhook",
        ],
    ),
    (
        "security",
        &["encryption_key", "rate_limit", "outbound_rate_limit"],
    ),
    (
        "webhook",
        &["access_token", "dedup_ttl_secs", "dedup_max_entries"],
    ),
    ("logging", &["format", "level", "file"]),
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut row = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            row[j + 1] = (prev[j + 1] + 1).min(row[j] + 1).min(prev[j] + cost);
        }
        prev = row;
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_keys(
    obj: &serde_json::Map<String, Value>,
    known: &[&str],
    prefix: &str,
    out: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut found = false;
    for key in obj.keys() {
        if known_set.contains(key.as_str()) {
            continue;
        }
        found = true;
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let msg = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}', {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        out.push(Diagnostic::new(DiagnosticLevel::Error, &path, msg));
    }
    found
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                "",
                "Config must be a JSON object",
            ));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = unknown_keys(obj, KNOWN_TOP_LEVEL, "", &mut diagnostics);
    for (section, known) in KNOWN_SECTIONS {
        if let Some(section_obj) = obj.get(*section).and_then(Value::as_object) {
            has_unknown |= unknown_keys(section_obj, known, section, &mut diagnostics);
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }
    diagnostics
}

/// Check loaded values. Errors block startup, warnings are advisory.
pub fn check_values(config: &Config) -> Vec<Diagnostic> {
    use DiagnosticLevel::*;
    let mut out = Vec::new();

    if config.provider.kind == ProviderKind::Custom
        && config.provider.custom_mode == CustomMode::Production
    {
        out.push(Diagnostic::new(
            Error,
            "provider.custom_mode",
            "the custom gateway is test-only and cannot run in production mode",
        ));
    }
    if config.provider.kind == ProviderKind::Asaas
        && config
            .provider
            .asaas
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .is_none()
    {
        out.push(Diagnostic::new(
            Warn,
            "provider.asaas.api_key",
            "not set; the test-mode gateway will be used",
        ));
    }
    if config.provider.asaas.timeout_secs == 0 {
        out.push(Diagnostic::new(
            Error,
            "provider.asaas.timeout_secs",
            "must be greater than 0",
        ));
    }

    if config.queue.concurrency == 0 {
        out.push(Diagnostic::new(
            Error,
            "queue.concurrency",
            "must be at least 1",
        ));
    }
    if config.queue.job_timeout_secs == 0 {
        out.push(Diagnostic::new(
            Error,
            "queue.job_timeout_secs",
            "must be greater than 0",
        ));
    }
    for (name, retry) in [
        ("queue.create_payment", &config.queue.create_payment),
        ("queue.process_webhook", &config.queue.process_webhook),
    ] {
        if retry.max_attempts == 0 {
            out.push(Diagnostic::new(
                Error,
                &format!("{}.max_attempts", name),
                "must be at least 1",
            ));
        }
        if retry.max_delay_ms < retry.base_delay_ms {
            out.push(Diagnostic::new(
                Warn,
                &format!("{}.max_delay_ms", name),
                "smaller than base_delay_ms; every retry waits max_delay_ms",
            ));
        }
    }

    match config.security.encryption_key.as_deref() {
        Some(key) => {
            if let Err(e) = FieldCipher::from_hex(key) {
                out.push(Diagnostic::new(
                    Error,
                    "security.encryption_key",
                    e.to_string(),
                ));
            }
        }
        None => out.push(Diagnostic::new(
            Warn,
            "security.encryption_key",
            "not set; field encryption is unavailable",
        )),
    }
    for (name, limit) in [
        ("security.rate_limit", &config.security.rate_limit),
        (
            "security.outbound_rate_limit",
            &config.security.outbound_rate_limit,
        ),
    ] {
        if limit.window_ms == 0 {
            out.push(Diagnostic::new(
                Error,
                &format!("{}.window_ms", name),
                "must be greater than 0",
            ));
        }
        if limit.max_requests == 0 {
            out.push(Diagnostic::new(
                Warn,
                &format!("{}.max_requests", name),
                "0 rejects every request",
            ));
        }
    }

    if config
        .webhook
        .access_token
        .as_deref()
        .filter(|k| !k.is_empty())
            .is_none()
    {
        out.push(Diagnostic::new(
            Warn,
            "webhook.access_token",
            "not set; inbound webhooks are not authenticated",
        ));
    }
    if config.webhook.dedup_max_entries == 0 {
        out.push(Diagnostic::new(
            Error,
            "webhook.dedup_max_entries",
            "must be at least 1",
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("hello", "hello"), 0);
        assert_eq!(levenshtein("hello", "helo"), 1);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_suggest_field() {
        assert_eq!(
            suggest_field("provder", KNOWN_TOP_LEVEL).as_deref(),
            Some("did you mean 'provider'?")
        );
        assert!(suggest_field("zzzzzzzzzz", KNOWN_TOP_LEVEL).is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let raw = json!({
            "provider": { "kind": "custom" },
            "queue": { "concurrency": 3 }
        });
        let diags = validate_config(&raw);
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
    }

    #[test]
    fn test_validate_unknown_nested_field() {
        let raw = json!({ "queue": { "concurency": 3 } });
        let diags = validate_config(&raw);
        let err = diags
            .iter()
            .find(|d| d.level == DiagnosticLevel::Error)
            .unwrap();
        assert_eq!(err.path, "queue.concurency");
        assert!(err.message.contains("did you mean 'concurrency'?"));
    }

    #[test]
    fn test_validate_not_an_object() {
        let diags = validate_config(&json!("not an object"));
        assert!(diags.iter().any(|d| {
            d.level == DiagnosticLevel::Error && d.message.contains("must be a JSON object")
        }));
    }

    #[test]
    fn test_check_values_defaults_only_warn() {
        let diags = check_values(&Config::default());
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
        assert!(diags.iter().any(|d| d.path == "webhook.access_token"));
        assert!(diags.iter().any(|d| d.path == "security.encryption_key"));
    }

    #[test]
    fn test_check_values_errors() {
        let mut config = Config::default();
        config.queue.process_webhook.max_attempts = 0;
        config.security.rate_limit.window_ms = 0;
        let diags = check_values(&config);
        let errors: Vec<_> = diags
            .iter()
            .filter(|d| d.level == DiagnosticLevel::Error)
            .map(|d| d.path.as_str())
            .collect();
        assert!(errors.contains(&"queue.process_webhook.max_attempts"));
        assert!(errors.contains(&"security.rate_limit.window_ms"));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticLevel::Warn, "a.b", "careful");
        assert_eq!(d.to_string(), "[WARN] a.b: careful");
    }
}
