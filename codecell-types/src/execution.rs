//! Types shared between the orchestrator and the sandbox: a materialized
//! program ready to run, and the outcome of running it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem policy applied to a single sandbox call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsPolicy {
    /// Root filesystem is always read-only; this flag only documents the
    /// invariant for callers that serialize the policy.
    pub read_only_root: bool,
    /// Writable scratch directory bound by `disk_bytes`.
    pub writable_scratch: PathBuf,
    pub disk_bytes: u64,
    /// Additional read-only mounts, e.g. the materialized code file.
    pub mounts: Vec<PathBuf>,
}

impl Default for FsPolicy {
    fn default() -> Self {
        Self {
            read_only_root: true,
            writable_scratch: PathBuf::from("/scratch"),
            disk_bytes: 64 * 1024 * 1024,
            mounts: Vec::new(),
        }
    }
}

/// Network policy. Sandboxed code gets no network access by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetPolicy {
    #[default]
    DenyAll,
}

/// Derived from an [`crate::intent::Intent`] after routing — the unit of
/// work handed to the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub timeout_ms: u64,
    pub memory_bytes: u64,
    pub process_limit: u32,
    pub fs_policy: FsPolicy,
    pub net_policy: NetPolicy,
    pub workdir: PathBuf,
}

/// The kind of resource that was exceeded, when `status == resource_exceeded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    Processes,
    Disk,
}

/// Terminal outcome of a sandbox call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    TimedOut,
    ResourceExceeded,
    Rejected,
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub exit_code: Option<i32>,
    pub resource_kind: Option<ResourceKind>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub wall_time_ms: u64,
    pub peak_memory_bytes: Option<u64>,
}

impl ExecutionResult {
    pub fn is_authoritative(&self) -> bool {
        matches!(
            self.status,
            ExecutionStatus::Completed
                | ExecutionStatus::TimedOut
                | ExecutionStatus::ResourceExceeded
        )
    }
}
