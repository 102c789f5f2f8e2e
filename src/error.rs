//! Error types for Paygate
//!
//! This module defines all error types used throughout the crate.
//! Uses `thiserror` for ergonomic error handling with automatic `Display` and
//! `Error` trait implementations.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Gateway Error Classification
// ============================================================================

/// Structured payment-gateway error classification.
///
/// Lets the job queue decide between retry and dead-letter without string
/// matching on vendor messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// 401/403: Invalid API key or authentication failure
    Auth(String),
    /// 429: Rate limit or quota exceeded
    RateLimit(String),
    /// 400/422: Validation error, malformed parameters
    InvalidRequest(String),
    /// 404: Payment or customer not found on the gateway
    NotFound(String),
    /// 500/502/503/504: Server-side errors
    ServerError(String),
    /// Connection or read timeout
    Timeout(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            GatewayError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            GatewayError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            GatewayError::NotFound(msg) => write!(f, "Not found on gateway: {}", msg),
            GatewayError::ServerError(msg) => write!(f, "Server error: {}", msg),
            GatewayError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            GatewayError::Unknown(msg) => write!(f, "Unknown gateway error: {}", msg),
        }
    }
}

impl GatewayError {
    /// Classify an HTTP status code returned by a gateway.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => GatewayError::Auth(message),
            429 => GatewayError::RateLimit(message),
            400 | 422 => GatewayError::InvalidRequest(message),
            404 => GatewayError::NotFound(message),
            500..=599 => GatewayError::ServerError(message),
            _ => GatewayError::Unknown(message),
        }
    }

    /// Returns `true` if this error is transient and the call should be retried.
    ///
    /// Retryable errors: RateLimit, ServerError, Timeout.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimit(_) | GatewayError::ServerError(_) | GatewayError::Timeout(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GatewayError::Auth(_) => Some(401),
            GatewayError::RateLimit(_) => Some(429),
            GatewayError::InvalidRequest(_) => Some(400),
            GatewayError::NotFound(_) => Some(404),
            GatewayError::ServerError(_) => Some(500),
            GatewayError::Timeout(_) => None,
            GatewayError::Unknown(_) => None,
        }
    }
}

impl From<GatewayError> for PaygateError {
    fn from(err: GatewayError) -> Self {
        PaygateError::Gateway(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Paygate operations.
#[derive(Error, Debug)]
pub enum PaygateError {
    /// Configuration-related errors (invalid config, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Structured gateway error with classification for retry decisions.
    #[error("Gateway error: {0}")]
    Gateway(GatewayError),

    /// Webhook or job payload that cannot be interpreted
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No agreement matched an inbound webhook after every reconciliation tier
    #[error("Agreement not found for vendor payment {payment_id}")]
    AgreementNotFound { payment_id: String },

    /// Encryption or decryption failure (wrong key, tampered blob, bad encoding)
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Admission control rejected the request
    #[error("Rate limit exceeded for {key}")]
    RateLimited { key: String },

    /// Persistence collaborator failure
    #[error("Store error: {0}")]
    Store(String),

    /// Job queue failures (closed channel, unknown operation state, etc.)
    #[error("Queue error: {0}")]
    Queue(String),

    /// Resource not found (jobs, simulated payments, customers, etc.)
    #[error("Not found: {0}")]
    NotFound(String),

    /// A payment lifecycle transition that the state machine forbids
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// The test-mode gateway was configured for production use
    #[error("Custom gateway cannot be used in production mode; set provider.custom_mode to \"test\" or use a live provider")]
    ProductionBlocked,

    /// Authentication failures (webhook access token mismatch)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// An operation ran past its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl PaygateError {
    /// Returns `true` if a queued job failing with this error should be retried.
    ///
    /// A reconciliation miss is retryable because the agreement may be created
    /// moments after the webhook arrives.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaygateError::Gateway(err) => err.is_retryable(),
            PaygateError::AgreementNotFound { .. }
            | PaygateError::RateLimited { .. }
            | PaygateError::Store(_)
            | PaygateError::Timeout(_)
            | PaygateError::Io(_)
            | PaygateError::Http(_) => true,
            PaygateError::Config(_)
            | PaygateError::InvalidPayload(_)
            | PaygateError::Crypto(_)
            | PaygateError::Queue(_)
            | PaygateError::NotFound(_)
            | PaygateError::InvalidTransition(_)
            | PaygateError::ProductionBlocked
            | PaygateError::Unauthorized(_)
            | PaygateError::Json(_) => false,
        }
    }
}

/// A specialized `Result` type for Paygate operations.
pub type Result<T> = std::result::Result<T, PaygateError>;
