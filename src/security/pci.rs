//! PCI log redaction.
//!
//! Every payload that reaches a log line or a metadata column goes through
//! [`sanitize`] first. Matching is on exact, case-sensitive key names.

use serde_json::{Map, Value};

/// Replacement for secret values.
pub const REDACTED: &str = "[REDACTED]";

const SENSITIVE_KEYS: &[&str] = &[
    "cardNumber",
    "card_number",
    "cvv",
    "cvc",
    "securityCode",
    "security_code",
    "password",
    "secret",
    "token",
    "access_token",
    "accessToken",
    "apiKey",
    "api_key",
];

const DOCUMENT_KEYS: &[&str] = &["cpfCnpj", "cpf_cnpj", "document"];

/// Return a redacted copy of `value`. The input is never modified.
///
/// Idempotent: `sanitize(&sanitize(v)) == sanitize(v)`.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(sanitize_map(map)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        other => other.clone(),
    }
}

fn sanitize_map(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let cleaned = if SENSITIVE_KEYS.contains(&key.as_str()) {
                Value::String(REDACTED.to_string())
            } else if DOCUMENT_KEYS.contains(&key.as_str()) {
                match value {
                    Value::String(s) => Value::String(mask_document(s)),
                    Value::Number(n) => Value::String(mask_document(&n.to_string())),
                    Value::Null => Value::Null,
                    nested => sanitize(nested),
                }
            } else {
                sanitize(value)
            };
            (key.clone(), cleaned)
        })
        .collect()
}

/// Mask a CPF/CNPJ keeping the first 3 and last 2 digits.
///
/// Punctuation is dropped; `*` already present is kept so a masked value
/// masks to itself. Five characters or fewer are fully masked.
pub fn mask_document(document: &str) -> String {
    let cleaned: Vec<char> = document
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '*')
        .collect();
    let len = cleaned.len();
    if len <= 5 {
        return "*".repeat(len);
    }
    let head: String = cleaned[..3].iter().collect();
    let tail: String = cleaned[len - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(len - 5), tail)
}

/// Mask a card number keeping only the last 4 digits.
pub fn mask_card_number(card_number: &str) -> String {
    let cleaned: Vec<char> = card_number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if cleaned.len() < 4 {
        return "****".to_string();
    }
    let last_four: String = cleaned[cleaned.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(cleaned.len() - 4), last_four)
}

/// Sanitize and render compactly for a log field.
pub fn sanitized_json(value: &Value) -> String {
    sanitize(value).to_string()
}
