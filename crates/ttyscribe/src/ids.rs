//! Identifier generation.
//!
//! Builders and stores take an [`IdGenerator`] instead of reaching for a global
//! counter, so a transcript can be rebuilt deterministically in tests.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of process-locally unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// Return a fresh identifier of the form `<prefix>_<unique>`.
    fn next_id(&self, prefix: &str) -> String;
}

/// Random identifiers (`msg_3f2a...`), the default outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
    }
}

/// Monotonic counter identifiers (`msg_1`, `msg_2`, ...).
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}", prefix, n)
    }
}
