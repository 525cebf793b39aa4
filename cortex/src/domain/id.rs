// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Identifier Generation
//!
//! Two flavours of identifier are produced here:
//!
//! - **Unique ids** ([`IdGenerator::next_id`]) for messages and correlation ids.
//!   A process-wide monotonic counter is combined with a SHA-256 digest over the
//!   generator nonce, the counter value and caller-supplied content, so ids from
//!   independent generators running concurrently never collide.
//! - **Content ids** ([`IdGenerator::content_id`]) for patterns. These are
//!   deterministic: equal content always maps to the same id. The digest is
//!   computed by a pluggable [`ContentHasher`] so collision handling can be
//!   exercised with a degenerate hasher.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Process-wide sequence shared by every generator.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Number of hex digits kept from a content digest.
pub const CONTENT_ID_HEX_LEN: usize = 16;

/// Digest function used to derive content ids.
pub trait ContentHasher: Send + Sync {
    /// Returns a lowercase hex digest of `content`.
    fn digest(&self, content: &[u8]) -> String;
}

/// Default hasher: SHA-256, hex encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn digest(&self, content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        hex::encode(hasher.finalize())
    }
}

#[derive(Clone)]
pub struct IdGenerator {
    prefix: String,
    nonce: Uuid,
    hasher: Arc<dyn ContentHasher>,
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator")
            .field("prefix", &self.prefix)
            .field("nonce", &self.nonce)
            .finish()
    }
}

impl IdGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_hasher(prefix, Arc::new(Sha256Hasher))
    }

    pub fn with_hasher(prefix: impl Into<String>, hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            prefix: prefix.into(),
            nonce: Uuid::new_v4(),
            hasher,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Produce a fresh, collision-resistant id of the form
    /// `<prefix>-<sequence>-<digest>`.
    pub fn next_id(&self, content: &[u8]) -> String {
        let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let mut hasher = Sha256::new();
        hasher.update(self.nonce.as_bytes());
        hasher.update(sequence.to_be_bytes());
        hasher.update(content);
        let digest = hex::encode(hasher.finalize());

        format!("{}-{:012x}-{}", self.prefix, sequence, &digest[..12])
    }

    /// Deterministic id derived only from `content`.
    pub fn content_id(&self, content: &[u8]) -> String {
        let digest = self.hasher.digest(content);
        digest.chars().take(CONTENT_ID_HEX_LEN).collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new("id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_next_id_has_prefix_and_is_unique() {
        let generator = IdGenerator::new("msg");
        let a = generator.next_id(b"payload");
        let b = generator.next_id(b"payload");

        assert!(a.starts_with("msg-"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_content_id_is_deterministic() {
        let first = IdGenerator::new("pattern");
        let second = IdGenerator::new("other");

        assert_eq!(first.content_id(b"sequence:a>b>c"), second.content_id(b"sequence:a>b>c"));
        assert_ne!(first.content_id(b"sequence:a>b>c"), first.content_id(b"sequence:a>b"));
        assert_eq!(first.content_id(b"x").len(), CONTENT_ID_HEX_LEN);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_generators_produce_unique_ids() {
        let mut handles = Vec::new();
        for worker in 0..10 {
            handles.push(tokio::spawn(async move {
                let generator = IdGenerator::new("corr");
                (0..100)
                    .map(|_| generator.next_id(format!("worker-{}", worker).as_bytes()))
                    .collect::<Vec<_>>()
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                ids.insert(id);
            }
        }

        assert_eq!(ids.len(), 1000);
    }
}
