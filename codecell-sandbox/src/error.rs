use thiserror::Error;

/// Failures that can happen while constructing or driving a sandbox backend.
/// Distinct from [`codecell_types::execution::ExecutionResult`], which
/// carries the *outcome* of a call that did launch successfully.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("in-process backend refused to build: production mode is active")]
    InProcessInProduction,

    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("pool exhausted: no sandbox instance available")]
    PoolExhausted,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
