//! Remote backend: commands dispatched to a key-value server supporting
//! per-key TTL. The server itself is an out-of-scope external collaborator
//! (§6 "Persisted state"); this module only defines the narrow trait
//! boundary and the adapter that turns its failures into
//! `backend_unavailable`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::backend::{ContextBackend, ContextError};

/// Narrow interface to the remote key-value server. A real implementation
/// would speak whatever wire protocol that server exposes; codecell only
/// depends on this trait.
#[async_trait]
pub trait RemoteKvClient: Send + Sync {
    async fn kv_get(&self, key: &str) -> Result<Option<Value>, String>;
    async fn kv_set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), String>;
    async fn kv_delete(&self, key: &str) -> Result<(), String>;
    async fn kv_scan_prefix(&self, prefix: &str) -> Result<Vec<String>, String>;
    async fn kv_len(&self) -> Result<usize, String>;
}

pub struct RemoteKvBackend<C: RemoteKvClient> {
    max_value_bytes: u64,
    client: C,
}

impl<C: RemoteKvClient> RemoteKvBackend<C> {
    pub fn new(client: C, max_value_bytes: u64) -> Self {
        Self {
            client,
            max_value_bytes,
        }
    }
}

#[async_trait]
impl<C: RemoteKvClient> ContextBackend for RemoteKvBackend<C> {
    async fn get(&self, key: &str) -> Result<Option<Value>, ContextError> {
        self.client
            .kv_get(key)
            .await
            .map_err(ContextError::BackendUnavailable)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), ContextError> {
        let size = crate::entry::value_size_bytes(&value);
        if size > self.max_value_bytes {
            return Err(ContextError::PayloadTooLarge {
                size,
                max: self.max_value_bytes,
            });
        }
        self.client
            .kv_set(key, value, ttl)
            .await
            .map_err(ContextError::BackendUnavailable)
    }

    async fn delete(&self, key: &str) -> Result<(), ContextError> {
        self.client
            .kv_delete(key)
            .await
            .map_err(ContextError::BackendUnavailable)
    }

    async fn size(&self) -> Result<usize, ContextError> {
        self.client
            .kv_len()
            .await
            .map_err(ContextError::BackendUnavailable)
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), ContextError> {
        let keys = self
            .client
            .kv_scan_prefix(prefix)
            .await
            .map_err(ContextError::BackendUnavailable)?;
        for key in keys {
            self.client
                .kv_delete(&key)
                .await
                .map_err(ContextError::BackendUnavailable)?;
        }
        Ok(())
    }
}
