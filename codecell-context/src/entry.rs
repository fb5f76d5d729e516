//! The stored unit: `(key, value, created_at, ttl_seconds, size_bytes)`.

use serde_json::Value;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct ContextEntry {
    pub value: Value,
    pub created_at: Instant,
    pub ttl: Duration,
    pub size_bytes: u64,
    pub(crate) last_accessed: Instant,
}

impl ContextEntry {
    pub fn new(value: Value, ttl: Duration, size_bytes: u64) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            ttl,
            size_bytes,
            last_accessed: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() >= self.ttl
    }

    pub fn touch(&mut self) {
        self.last_accessed = Instant::now();
    }
}

/// Serializes a JSON value the way it would cross the wire, to determine
/// its stored size. Approximate but deterministic and cheap.
pub fn value_size_bytes(value: &Value) -> u64 {
    serde_json::to_vec(value).map(|v| v.len() as u64).unwrap_or(0)
}
