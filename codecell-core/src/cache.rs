//! Cache-key canonicalization and the thin wrapper over [`ContextStore`]
//! the orchestrator uses for lookups/writes. `Intent::cache_key` already
//! canonicalizes via a sorted `BTreeMap`; this module owns the `cache:`
//! key prefix and the wrapping of a stored response back into a value the
//! orchestrator can return verbatim.

use codecell_context::ContextStore;
use codecell_types::{Intent, Response};

pub fn cache_key(intent: &Intent) -> String {
    format!("cache:{}", intent.cache_key())
}

pub async fn lookup(store: &ContextStore, intent: &Intent) -> Option<Response> {
    let key = cache_key(intent);
    let value = store.get(&key).await.ok().flatten()?;
    serde_json::from_value(value).ok()
}

pub async fn store_response(
    store: &ContextStore,
    intent: &Intent,
    response: &Response,
    ttl_seconds: u64,
) {
    let key = cache_key(intent);
    if let Ok(value) = serde_json::to_value(response) {
        let _ = store.set(&key, value, Some(ttl_seconds)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecell_context::InMemoryBackend;
    use codecell_types::response::Mode;
    use codecell_types::{Metadata, TraceId};

    fn metadata() -> Metadata {
        Metadata {
            tokens_used: 3,
            execution_time_ms: 5,
            cache_hit: false,
            mode: Mode::CodeExecution,
            trace_id: TraceId::new(),
        }
    }

    #[tokio::test]
    async fn round_trips_through_the_store() {
        let store = ContextStore::new(Box::new(InMemoryBackend::default()));
        let intent = Intent::new("echo").with_param("message", serde_json::json!("hi"));
        let response = Response::success(
            "completed",
            serde_json::json!({"stdout": "hi\n"}),
            metadata(),
            serde_json::Value::Null,
        );

        assert!(lookup(&store, &intent).await.is_none());
        store_response(&store, &intent, &response, 300).await;
        assert!(lookup(&store, &intent).await.is_some());
    }

    #[tokio::test]
    async fn key_order_does_not_affect_cache_hit() {
        let store = ContextStore::new(Box::new(InMemoryBackend::default()));
        let a = Intent::new("echo")
            .with_param("a", serde_json::json!(1))
            .with_param("b", serde_json::json!(2));
        let b = Intent::new("echo")
            .with_param("b", serde_json::json!(2))
            .with_param("a", serde_json::json!(1));
        let response = Response::success(
            "completed",
            serde_json::json!({}),
            metadata(),
            serde_json::Value::Null,
        );

        store_response(&store, &a, &response, 300).await;
        assert!(lookup(&store, &b).await.is_some());
    }
}
