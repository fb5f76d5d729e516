//! Optional optimization over the container tier: a fixed number of
//! pre-launched quiescent containers, leased per call and returned on
//! completion. A container that observed any outcome other than
//! `completed` is destroyed rather than recycled, since its guarantees
//! about prior state are no longer trustworthy.

use std::collections::VecDeque;

use codecell_types::execution::{ExecutionRequest, ExecutionResult, ExecutionStatus};
use parking_lot::Mutex;

use crate::container::ContainerRuntime;
use crate::error::SandboxError;

pub struct SandboxPool<R: ContainerRuntime> {
    runtime: R,
    idle: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl<R: ContainerRuntime> SandboxPool<R> {
    pub fn new(runtime: R, capacity: usize) -> Self {
        Self {
            runtime,
            idle: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Leases an idle container, pre-launching one if the pool is below
    /// capacity and currently empty. Never lends the same container id to
    /// two concurrent callers: the id is removed from `idle` the moment it
    /// is handed out.
    pub async fn lease(&self) -> Result<String, SandboxError> {
        if let Some(id) = self.idle.lock().pop_front() {
            return Ok(id);
        }
        self.runtime.spawn_quiescent().await
    }

    /// Runs `request` on a leased container and returns it to the pool only
    /// if the outcome was `completed`; otherwise it is destroyed.
    pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult, SandboxError> {
        let container_id = self.lease().await?;
        self.runtime.exec(&container_id, request).await?;
        let outcome = self
            .runtime
            .wait(&container_id, std::time::Duration::from_millis(request.timeout_ms))
            .await;
        let peak_memory_bytes = self.runtime.peak_memory_bytes(&container_id).await;
        let result = crate::container::outcome_to_result(outcome, peak_memory_bytes);

        if result.status == ExecutionStatus::Completed {
            self.return_container(container_id);
        } else {
            self.runtime.destroy(&container_id).await?;
        }

        Ok(result)
    }

    fn return_container(&self, container_id: String) {
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push_back(container_id);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}
