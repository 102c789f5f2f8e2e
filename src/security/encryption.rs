//! Field encryption at rest.
//!
//! ChaCha20-Poly1305 with a 256-bit key, a fresh 96-bit nonce per call and a
//! 128-bit tag. Blobs are `base64(nonce || ciphertext || tag)` using the
//! standard padded alphabet, so they fit in a text column.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};

use crate::error::{PaygateError, Result};

/// Key length in bytes.
pub const KEY_LEN: usize = 32;
/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Holds a parsed key. Immutable after construction and safe to share.
#[derive(Clone)]
pub struct FieldCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    /// Build a cipher from a 64-character hex key.
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| PaygateError::Crypto(format!("encryption key is not valid hex: {}", e)))?;
        if bytes.len() != KEY_LEN {
            return Err(PaygateError::Crypto(format!(
                "encryption key must be {} bytes ({} hex chars), got {} bytes",
                KEY_LEN,
                KEY_LEN * 2,
                bytes.len()
            )));
        }
        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&bytes)),
        })
    }

    pub fn encrypt_field(&self, plaintext: &str) -> Result<String> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|_| PaygateError::Crypto("encryption failed".into()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        Ok(STANDARD.encode(blob))
    }

    pub fn decrypt_field(&self, blob: &str) -> Result<String> {
        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|e| PaygateError::Crypto(format!("ciphertext is not valid base64: {}", e)))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(PaygateError::Crypto(format!(
                "ciphertext too short: {} bytes",
                raw.len()
            )));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| {
                PaygateError::Crypto("authentication failed: wrong key or tampered data".into())
            })?;

        String::from_utf8(plain)
            .map_err(|_| PaygateError::Crypto("decrypted data is not valid UTF-8".into()))
    }
}

/// Encrypt `plaintext` with a hex key. See [`FieldCipher::encrypt_field`].
pub fn encrypt(plaintext: &str, key_hex: &str) -> Result<String> {
    FieldCipher::from_hex(key_hex)?.encrypt_field(plaintext)
}

/// Decrypt a blob produced by [`encrypt`].
pub fn decrypt(blob: &str, key_hex: &str) -> Result<String> {
    FieldCipher::from_hex(key_hex)?.decrypt_field(blob)
}

/// Generate a fresh random key, hex encoded.
pub fn generate_key_hex() -> String {
    let key = ChaCha20Poly1305::generate_key(&mut OsRng);
    hex::encode(key)
}
