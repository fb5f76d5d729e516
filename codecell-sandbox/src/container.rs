//! Production-default tier. The real container daemon is out of scope —
//! this module defines the seam (`ContainerRuntime`) the orchestrator
//! injects a real implementation behind, and the `ContainerBackend` that
//! drives it through the same four-operation lifecycle as every other
//! tier, delegating the actual isolation work to an external helper
//! process rather than implementing it in-crate.

use std::time::Duration;

use async_trait::async_trait;
use codecell_types::execution::{ExecutionRequest, ExecutionResult, ExecutionStatus, ResourceKind};

use crate::backend::{SandboxBackend, SandboxCall};
use crate::error::SandboxError;
use crate::lifecycle::LifecycleState;

/// Terminal outcome as reported by the runtime's own wait call.
#[derive(Debug, Clone)]
pub enum ContainerWaitOutcome {
    Exited {
        code: i32,
        stdout: Vec<u8>,
        stderr: Vec<u8>,
        stdout_truncated: bool,
        stderr_truncated: bool,
    },
    OomKilled,
    PidsLimitKilled,
    TimedOut,
    LaunchFailed(String),
}

/// The seam between this crate and a real container daemon (runc, youki,
/// a Firecracker VMM, …). None of the implementors live in this crate.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Creates and starts a fresh rootless container for this request.
    /// Returns an opaque container id.
    async fn create(&self, request: &ExecutionRequest) -> Result<String, SandboxError>;

    /// Pre-launches a quiescent container with no code loaded yet, for the
    /// pool to hold idle. Only called by [`crate::pool::SandboxPool`].
    async fn spawn_quiescent(&self) -> Result<String, SandboxError>;

    /// Loads and starts a request inside a previously quiescent container.
    async fn exec(&self, container_id: &str, request: &ExecutionRequest) -> Result<(), SandboxError>;

    /// Blocks until the container exits or `timeout` elapses.
    async fn wait(&self, container_id: &str, timeout: Duration) -> ContainerWaitOutcome;

    async fn kill(&self, container_id: &str) -> Result<(), SandboxError>;

    /// Tears the container down, releasing its namespaces/cgroup.
    async fn destroy(&self, container_id: &str) -> Result<(), SandboxError>;

    async fn peak_memory_bytes(&self, container_id: &str) -> Option<u64>;
}

pub struct ContainerBackend<R: ContainerRuntime> {
    runtime: R,
}

impl<R: ContainerRuntime> ContainerBackend<R> {
    pub fn new(runtime: R) -> Self {
        Self { runtime }
    }
}

struct ContainerCall {
    container_id: String,
}

#[async_trait]
impl<R: ContainerRuntime> SandboxBackend for ContainerBackend<R> {
    async fn launch(&self, request: &ExecutionRequest) -> Result<SandboxCall, SandboxError> {
        let container_id = self.runtime.create(request).await?;
        let mut call = SandboxCall::new(ContainerCall { container_id });
        call.state = LifecycleState::Running;
        Ok(call)
    }

    async fn wait(&self, call: &mut SandboxCall, timeout: Duration) -> ExecutionResult {
        let container_id = call.downcast_mut::<ContainerCall>().container_id.clone();
        let outcome = self.runtime.wait(&container_id, timeout).await;
        let peak_memory_bytes = self.runtime.peak_memory_bytes(&container_id).await;
        call.state = LifecycleState::Reaped;
        outcome_to_result(outcome, peak_memory_bytes)
    }

    async fn kill(&self, call: &mut SandboxCall) -> Result<(), SandboxError> {
        let container_id = call.downcast_mut::<ContainerCall>().container_id.clone();
        call.state = LifecycleState::Killed;
        self.runtime.kill(&container_id).await
    }

    async fn reap(&self, call: SandboxCall) -> Result<(), SandboxError> {
        let container_call = call.downcast::<ContainerCall>();
        self.runtime.destroy(&container_call.container_id).await
    }
}

pub(crate) fn outcome_to_result(
    outcome: ContainerWaitOutcome,
    peak_memory_bytes: Option<u64>,
) -> ExecutionResult {
    match outcome {
        ContainerWaitOutcome::Exited {
            code,
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
        } => ExecutionResult {
            status: ExecutionStatus::Completed,
            exit_code: Some(code),
            resource_kind: None,
            stdout,
            stderr,
            stdout_truncated,
            stderr_truncated,
            wall_time_ms: 0,
            peak_memory_bytes,
        },
        ContainerWaitOutcome::OomKilled => resource_result(ResourceKind::Memory, peak_memory_bytes),
        ContainerWaitOutcome::PidsLimitKilled => {
            resource_result(ResourceKind::Processes, peak_memory_bytes)
        }
        ContainerWaitOutcome::TimedOut => ExecutionResult {
            status: ExecutionStatus::TimedOut,
            exit_code: None,
            resource_kind: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            wall_time_ms: 0,
            peak_memory_bytes,
        },
        ContainerWaitOutcome::LaunchFailed(_) => ExecutionResult {
            status: ExecutionStatus::InternalError,
            exit_code: None,
            resource_kind: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: false,
            stderr_truncated: false,
            wall_time_ms: 0,
            peak_memory_bytes: None,
        },
    }
}

fn resource_result(kind: ResourceKind, peak_memory_bytes: Option<u64>) -> ExecutionResult {
    ExecutionResult {
        status: ExecutionStatus::ResourceExceeded,
        exit_code: None,
        resource_kind: Some(kind),
        stdout: Vec::new(),
        stderr: Vec::new(),
        stdout_truncated: false,
        stderr_truncated: false,
        wall_time_ms: 0,
        peak_memory_bytes,
    }
}
