//! Public façade the orchestrator uses. Owns a pluggable backend chosen at
//! construction time.

use std::time::Duration;

use serde_json::Value;

use crate::backend::{ContextBackend, ContextError};

pub const DEFAULT_TTL_SECS: u64 = 300;

pub struct ContextStore {
    backend: Box<dyn ContextBackend>,
}

impl ContextStore {
    pub fn new(backend: Box<dyn ContextBackend>) -> Self {
        Self { backend }
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, ContextError> {
        self.backend.get(key).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), ContextError> {
        let ttl = Duration::from_secs(ttl_seconds.unwrap_or(DEFAULT_TTL_SECS));
        self.backend.set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), ContextError> {
        self.backend.delete(key).await
    }

    pub async fn size(&self) -> Result<usize, ContextError> {
        self.backend.size().await
    }

    pub async fn clear_session(&self, session_prefix: &str) -> Result<(), ContextError> {
        self.backend.clear_prefix(session_prefix).await
    }
}
