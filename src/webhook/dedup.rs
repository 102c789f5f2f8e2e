use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::utils::clock::Clock;

/// Remembers recently seen webhook keys so redeliveries are dropped at ingress.
///
/// The gateway delivers at least once; this cache only cuts repeated work.
/// Correctness still relies on the idempotent status update downstream.
pub struct EventDeduplicator {
    entries: Mutex<HashMap<String, i64>>,
    ttl_ms: i64,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl EventDeduplicator {
    pub fn new(ttl_secs: u64, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_ms: i64::try_from(ttl_secs.saturating_mul(1_000)).unwrap_or(i64::MAX),
            max_entries: max_entries.max(1),
            clock,
        }
    }

    /// Dedup key for a webhook: the vendor event id, or a body digest.
    pub fn key_for(event_id: Option<&str>, body: &[u8]) -> String {
        match event_id.filter(|id| !id.is_empty()) {
            Some(id) => format!("evt:{}", id),
            None => format!("sha256:{}", hex::encode(Sha256::digest(body))),
        }
    }

    /// Returns true if the key is new and records it, false for a duplicate.
    pub fn check_and_record(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(&seen_at) = entries.get(key) {
            if now - seen_at < self.ttl_ms {
                return false;
            }
        }

        let cutoff = now.saturating_sub(self.ttl_ms);
        entries.retain(|_, seen_at| *seen_at > cutoff);

        if entries.len() >= self.max_entries {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, t)| **t)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }

        entries.insert(key.to_string(), now);
        true
    }

    /// Forget a key, letting the same webhook through again.
    pub fn forget(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
