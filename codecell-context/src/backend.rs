//! Pluggable backend contract: `{get, set, delete, clear}` per the design
//! notes, implemented as a variant type rather than open dispatch so the
//! production-mode guard on the sandbox's in-process tier has a direct
//! analogue here — callers always know statically which backend they hold.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("value of {size} bytes exceeds max {max} bytes")]
    PayloadTooLarge { size: u64, max: u64 },
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("session budget exceeded: {used} + {size} bytes would exceed max {max} bytes")]
    SessionBudgetExceeded { used: u64, size: u64, max: u64 },
}

#[async_trait]
pub trait ContextBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, ContextError>;
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), ContextError>;
    async fn delete(&self, key: &str) -> Result<(), ContextError>;
    async fn size(&self) -> Result<usize, ContextError>;
    /// Removes every key with the given prefix. Idempotent.
    async fn clear_prefix(&self, prefix: &str) -> Result<(), ContextError>;
}
