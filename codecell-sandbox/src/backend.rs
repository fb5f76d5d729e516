//! The `SandboxBackend` trait: the four-operation capability set every
//! isolation tier implements identically. A `SandboxCall` is the opaque,
//! backend-owned state produced by `launch` and threaded through the
//! remaining three calls — each backend downcasts it to its own concrete
//! state rather than the trait carrying a generic parameter, so
//! `Box<dyn SandboxBackend>` stays object-safe.

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use codecell_types::execution::{ExecutionRequest, ExecutionResult};

use crate::error::SandboxError;
use crate::lifecycle::LifecycleState;

pub struct SandboxCall {
    pub state: LifecycleState,
    inner: Box<dyn Any + Send>,
}

impl SandboxCall {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self {
            state: LifecycleState::Created,
            inner: Box::new(inner),
        }
    }

    pub fn downcast_mut<T: Any + Send>(&mut self) -> &mut T {
        self.inner
            .downcast_mut::<T>()
            .expect("SandboxCall used with the backend that did not create it")
    }

    pub fn downcast<T: Any + Send>(self) -> T {
        match self.inner.downcast::<T>() {
            Ok(boxed) => *boxed,
            Err(_) => panic!("SandboxCall used with the backend that did not create it"),
        }
    }
}

#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Starts a call; returns immediately once the child/container is
    /// spawned. Transitions `created -> running`, or `created -> killed`
    /// if the backend rejects the request outright (e.g. payload too large
    /// for the tier).
    async fn launch(&self, request: &ExecutionRequest) -> Result<SandboxCall, SandboxError>;

    /// Blocks until the call finishes or `timeout` elapses, whichever is
    /// first. The timer is independent of anything the child itself does.
    async fn wait(&self, call: &mut SandboxCall, timeout: Duration) -> ExecutionResult;

    /// Sends a kill signal. Idempotent; safe to call on an already-exited
    /// call.
    async fn kill(&self, call: &mut SandboxCall) -> Result<(), SandboxError>;

    /// Collects the exit status and releases all resources. Terminal:
    /// every call reaches `reaped` exactly once, on every path.
    async fn reap(&self, call: SandboxCall) -> Result<(), SandboxError>;
}
