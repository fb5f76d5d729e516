//! A thin namespacing layer over the context store: sessions are created
//! implicitly on first use and have no state machine beyond active/expired.
//! Only a `(session_id, created_at, ttl)` record lives here; the content
//! keys live directly in the context store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use codecell_types::SessionId;
use parking_lot::Mutex;
use serde_json::Value;

use crate::entry::value_size_bytes;
use crate::store::ContextStore;
use crate::ContextError;

/// Sum of per-session context sizes a single session may hold at once.
/// Exists independently of the backend's own `max_value_bytes`/`max_entries`
/// ceilings, which bound a single value and the store as a whole but say
/// nothing about one session hoarding an unbounded share of it.
pub const DEFAULT_PER_SESSION_BUDGET_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Expired,
}

#[derive(Debug, Clone, Copy)]
struct SessionMeta {
    created_at: Instant,
    ttl: Duration,
    total_bytes: u64,
}

impl SessionMeta {
    fn status(&self) -> SessionStatus {
        if self.created_at.elapsed() >= self.ttl {
            SessionStatus::Expired
        } else {
            SessionStatus::Active
        }
    }
}

pub struct SessionRegistry {
    store: Arc<ContextStore>,
    sessions: Mutex<HashMap<SessionId, SessionMeta>>,
    default_ttl: Duration,
    budget_bytes: u64,
}

impl SessionRegistry {
    pub fn new(store: Arc<ContextStore>, default_ttl: Duration) -> Self {
        Self::with_budget(store, default_ttl, DEFAULT_PER_SESSION_BUDGET_BYTES)
    }

    pub fn with_budget(store: Arc<ContextStore>, default_ttl: Duration, budget_bytes: u64) -> Self {
        Self {
            store,
            sessions: Mutex::new(HashMap::new()),
            default_ttl,
            budget_bytes,
        }
    }

    /// Touch (creating if absent) the session's metadata record.
    pub fn touch(&self, session_id: SessionId) {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(session_id)
            .and_modify(|meta| meta.created_at = Instant::now())
            .or_insert(SessionMeta {
                created_at: Instant::now(),
                ttl: self.default_ttl,
                total_bytes: 0,
            });
    }

    pub fn status(&self, session_id: &SessionId) -> SessionStatus {
        self.sessions
            .lock()
            .get(session_id)
            .map(SessionMeta::status)
            .unwrap_or(SessionStatus::Expired)
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .values()
            .filter(|meta| meta.status() == SessionStatus::Active)
            .count()
    }

    /// Bytes currently attributed to `session_id` across every key written
    /// through [`Self::set`]. Zero for an untouched or unknown session.
    pub fn usage_bytes(&self, session_id: &SessionId) -> u64 {
        self.sessions
            .lock()
            .get(session_id)
            .map(|meta| meta.total_bytes)
            .unwrap_or(0)
    }

    /// Writes a key under `session_id`'s namespace, rejecting the write with
    /// [`ContextError::SessionBudgetExceeded`] before it reaches the backend
    /// if it would push the session's running total past its budget.
    pub async fn set(
        &self,
        session_id: SessionId,
        key: &str,
        value: Value,
        ttl_seconds: Option<u64>,
    ) -> Result<(), ContextError> {
        self.touch(session_id);
        let size = value_size_bytes(&value);
        let used = self.usage_bytes(&session_id);
        if used + size > self.budget_bytes {
            return Err(ContextError::SessionBudgetExceeded {
                used,
                size,
                max: self.budget_bytes,
            });
        }

        let full_key = format!("{}{key}", session_id.key_prefix());
        self.store.set(&full_key, value, ttl_seconds).await?;

        if let Some(meta) = self.sessions.lock().get_mut(&session_id) {
            meta.total_bytes += size;
        }
        Ok(())
    }

    pub async fn get(&self, session_id: &SessionId, key: &str) -> Result<Option<Value>, ContextError> {
        let full_key = format!("{}{key}", session_id.key_prefix());
        self.store.get(&full_key).await
    }

    /// Explicit close: removes the session's metadata and every context key
    /// under its prefix.
    pub async fn close(&self, session_id: SessionId) -> Result<(), crate::ContextError> {
        self.sessions.lock().remove(&session_id);
        self.store.clear_session(&session_id.key_prefix()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory::InMemoryBackend;
    use std::time::Duration as StdDuration;

    #[tokio::test]
    async fn touch_creates_active_session() {
        let store = Arc::new(ContextStore::new(Box::new(InMemoryBackend::default())));
        let registry = SessionRegistry::new(store, StdDuration::from_secs(300));
        let id = SessionId::new();
        registry.touch(id);
        assert_eq!(registry.status(&id), SessionStatus::Active);
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test]
    async fn unregistered_session_is_expired() {
        let store = Arc::new(ContextStore::new(Box::new(InMemoryBackend::default())));
        let registry = SessionRegistry::new(store, StdDuration::from_secs(300));
        assert_eq!(registry.status(&SessionId::new()), SessionStatus::Expired);
    }

    #[tokio::test]
    async fn close_removes_prefixed_keys() {
        let store = Arc::new(ContextStore::new(Box::new(InMemoryBackend::default())));
        let registry = SessionRegistry::new(store.clone(), StdDuration::from_secs(300));
        let id = SessionId::new();
        registry.touch(id);
        store
            .set(&format!("{}foo", id.key_prefix()), serde_json::json!(1), None)
            .await
            .unwrap();

        registry.close(id).await.unwrap();

        assert_eq!(registry.status(&id), SessionStatus::Expired);
        assert_eq!(
            store.get(&format!("{}foo", id.key_prefix())).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn set_accumulates_toward_the_session_budget() {
        let store = Arc::new(ContextStore::new(Box::new(InMemoryBackend::default())));
        let registry = SessionRegistry::with_budget(store, StdDuration::from_secs(300), 1024);
        let id = SessionId::new();

        registry.set(id, "a", serde_json::json!("x".repeat(100)), None).await.unwrap();
        assert!(registry.usage_bytes(&id) >= 100);

        registry.set(id, "b", serde_json::json!("y".repeat(100)), None).await.unwrap();
        assert!(registry.usage_bytes(&id) >= 200);
    }

    #[tokio::test]
    async fn set_rejects_writes_past_the_session_budget() {
        let store = Arc::new(ContextStore::new(Box::new(InMemoryBackend::default())));
        let registry = SessionRegistry::with_budget(store, StdDuration::from_secs(300), 256);
        let id = SessionId::new();

        registry.set(id, "a", serde_json::json!("x".repeat(200)), None).await.unwrap();
        let before = registry.usage_bytes(&id);

        let err = registry
            .set(id, "b", serde_json::json!("y".repeat(200)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::SessionBudgetExceeded { .. }));
        assert_eq!(registry.usage_bytes(&id), before);
        assert_eq!(registry.get(&id, "b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn budgets_are_tracked_independently_per_session() {
        let store = Arc::new(ContextStore::new(Box::new(InMemoryBackend::default())));
        let registry = SessionRegistry::with_budget(store, StdDuration::from_secs(300), 256);
        let a = SessionId::new();
        let b = SessionId::new();

        registry.set(a, "k", serde_json::json!("x".repeat(200)), None).await.unwrap();
        registry.set(b, "k", serde_json::json!("y".repeat(200)), None).await.unwrap();

        assert!(registry.usage_bytes(&a) >= 200);
        assert!(registry.usage_bytes(&b) >= 200);
    }
}
