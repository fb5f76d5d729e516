//! Structured, line-delimited JSON audit log.
//!
//! `emit` never blocks the request path: it pushes onto an unbounded
//! channel and a dedicated background task drains it to disk, keeping
//! `emit` non-blocking even when the audit sink's disk is slow.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use codecell_types::TraceId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub trace_id: TraceId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub outcome: String,
    #[serde(flatten)]
    pub fields: Value,
}

impl AuditEvent {
    pub fn new(event: impl Into<String>, trace_id: TraceId, outcome: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.into(),
            trace_id,
            session_id: None,
            intent: None,
            outcome: outcome.into(),
            fields: Value::Null,
        }
    }

    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_fields(mut self, fields: Value) -> Self {
        self.fields = fields;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink channel closed")]
    ChannelClosed,
    #[error("failed to open audit sink at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Non-blocking handle used by request-path code to emit audit events.
#[derive(Clone)]
pub struct AuditSink {
    tx: UnboundedSender<AuditEvent>,
}

impl AuditSink {
    /// Spawn the background writer task and return a cheap, cloneable
    /// handle plus its join handle (useful for tests / graceful shutdown).
    pub async fn spawn(path: impl AsRef<Path>) -> Result<(Self, JoinHandle<()>), AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();
        let handle = tokio::spawn(async move {
            let mut file = file;
            while let Some(event) = rx.recv().await {
                if let Ok(mut line) = serde_json::to_vec(&event) {
                    line.push(b'\n');
                    let _ = file.write_all(&line).await;
                }
            }
        });

        Ok((Self { tx }, handle))
    }

    /// Enqueue an event. Never awaits disk I/O.
    pub fn emit(&self, event: AuditEvent) -> Result<(), AuditError> {
        self.tx.send(event).map_err(|_| AuditError::ChannelClosed)
    }
}
