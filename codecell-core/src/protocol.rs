//! The narrow seam to the external protocol collaborator — the thing that
//! actually knows how to talk to a given third-party service. It is out of
//! scope for this crate; only the trait the orchestrator calls through is
//! defined here.

use async_trait::async_trait;
use codecell_types::Intent;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("protocol collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("protocol collaborator rejected the call: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait ProtocolCollaborator: Send + Sync {
    /// Handles an intent the code path either can't or shouldn't run,
    /// returning the raw result payload the orchestrator shapes into a
    /// response. `cancellation` fires when the request's overall deadline
    /// expires; a well-behaved implementor observes it and closes its
    /// in-flight call rather than leaving it orphaned.
    async fn handle(
        &self,
        intent: &Intent,
        cancellation: CancellationToken,
    ) -> Result<Value, ProtocolError>;
}
