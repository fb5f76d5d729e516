//! The unit of request: a named operation plus a parameter bag.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::trace::SessionId;

/// A symbolic operation name plus parameters.
///
/// `params` uses a `BTreeMap` rather than a `HashMap` so that serialization
/// order is deterministic, which keeps cache-key canonicalization trivial
/// (see [`Intent::cache_key`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub name: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

impl Intent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Canonical cache key: intent name plus params serialized with sorted
    /// keys, so two calls with semantically equal params but different
    /// insertion order hit the same cache entry.
    pub fn cache_key(&self) -> String {
        let params = serde_json::to_string(&self.params).unwrap_or_default();
        format!("{}:{}", self.name, params)
    }

    /// Cheap, deterministic estimate of the byte size of this intent once
    /// serialized onto the wire.
    pub fn byte_len(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// Top-level client request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub intent: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl From<Request> for Intent {
    fn from(req: Request) -> Self {
        Intent {
            name: req.intent,
            params: req.params,
        }
    }
}

impl Request {
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id.as_deref().and_then(SessionId::from_string)
    }
}
