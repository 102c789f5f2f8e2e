//! Security module for Paygate
//!
//! Field encryption at rest, PCI redaction for logs and metadata, and
//! per-tenant admission control.

pub mod encryption;
pub mod pci;
pub mod rate_limit;

pub use encryption::{decrypt, encrypt, generate_key_hex, FieldCipher};
pub use pci::{mask_card_number, mask_document, sanitize};
pub use rate_limit::{SlidingWindowRateLimiter, TenantRateLimiter};
