//! In-proc backend: a mapping guarded by a mutex, LRU eviction, TTL checked
//! on read.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::backend::{ContextBackend, ContextError};
use crate::entry::{value_size_bytes, ContextEntry};

pub const DEFAULT_MAX_VALUE_BYTES: u64 = 100 * 1024;
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

pub struct InMemoryBackend {
    max_value_bytes: u64,
    max_entries: usize,
    entries: Mutex<HashMap<String, ContextEntry>>,
}

impl InMemoryBackend {
    pub fn new(max_value_bytes: u64, max_entries: usize) -> Self {
        Self {
            max_value_bytes,
            max_entries,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Evict the least-recently-used entry. Caller holds the lock.
    fn evict_one_locked(entries: &mut HashMap<String, ContextEntry>) {
        if let Some(key) = entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(k, _)| k.clone())
        {
            entries.remove(&key);
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VALUE_BYTES, DEFAULT_MAX_ENTRIES)
    }
}

#[async_trait]
impl ContextBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Value>, ContextError> {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => {
                entry.touch();
                Ok(Some(entry.value.clone()))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), ContextError> {
        let size = value_size_bytes(&value);
        if size > self.max_value_bytes {
            return Err(ContextError::PayloadTooLarge {
                size,
                max: self.max_value_bytes,
            });
        }

        let mut entries = self.entries.lock();
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            Self::evict_one_locked(&mut entries);
        }
        entries.insert(key.to_string(), ContextEntry::new(value, ttl, size));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ContextError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn size(&self) -> Result<usize, ContextError> {
        Ok(self.entries.lock().len())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), ContextError> {
        self.entries.lock().retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let backend = InMemoryBackend::default();
        backend
            .set("k", json!("v"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn delete_then_get_is_absent() {
        let backend = InMemoryBackend::default();
        backend
            .set("k", json!("v"), Duration::from_secs(60))
            .await
            .unwrap();
        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let backend = InMemoryBackend::default();
        backend
            .set("k", json!("v"), Duration::from_millis(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_write_fails_before_any_state_change() {
        let backend = InMemoryBackend::new(8, DEFAULT_MAX_ENTRIES);
        backend
            .set("k", json!("existing"), Duration::from_secs(60))
            .await
            .ok();
        let before = backend.get("k").await.unwrap();

        let big = json!("x".repeat(1000));
        let err = backend.set("k", big, Duration::from_secs(60)).await;
        assert!(err.is_err());
        assert_eq!(backend.get("k").await.unwrap(), before);
    }

    #[tokio::test]
    async fn clear_prefix_is_idempotent() {
        let backend = InMemoryBackend::default();
        backend
            .set("session:a:x", json!(1), Duration::from_secs(60))
            .await
            .unwrap();
        backend
            .set("session:b:x", json!(2), Duration::from_secs(60))
            .await
            .unwrap();

        backend.clear_prefix("session:a:").await.unwrap();
        backend.clear_prefix("session:a:").await.unwrap();

        assert_eq!(backend.get("session:a:x").await.unwrap(), None);
        assert_eq!(backend.get("session:b:x").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn eviction_drops_least_recently_used() {
        let backend = InMemoryBackend::new(DEFAULT_MAX_VALUE_BYTES, 2);
        backend.set("a", json!(1), Duration::from_secs(60)).await.unwrap();
        backend.set("b", json!(2), Duration::from_secs(60)).await.unwrap();
        // touch "a" so "b" becomes least-recently-used
        backend.get("a").await.unwrap();
        backend.set("c", json!(3), Duration::from_secs(60)).await.unwrap();

        assert_eq!(backend.get("b").await.unwrap(), None);
        assert_eq!(backend.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(backend.get("c").await.unwrap(), Some(json!(3)));
    }
}
