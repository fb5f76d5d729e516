//! Development-only tier: spawns the script with no rlimits, no namespaces,
//! no filter — useful for iterating on capability templates without a
//! container runtime installed, and actively dangerous anywhere else.
//! Construction itself enforces the production guard, not just convention:
//! a misconfigured call site cannot silently end up running untrusted code
//! unguarded in production.

use std::time::Duration;

use async_trait::async_trait;
use codecell_types::execution::{ExecutionRequest, ExecutionResult};

use crate::backend::{SandboxBackend, SandboxCall};
use crate::error::SandboxError;
use crate::interpreter::build_command;
use crate::lifecycle::LifecycleState;
use crate::process_instance::{KillReason, ProcessInstance};

pub struct InProcessBackend {
    _private: (),
}

impl InProcessBackend {
    /// The only constructor. Refuses to build when `production` is true.
    pub fn build(production: bool) -> Result<Self, SandboxError> {
        if production {
            return Err(SandboxError::InProcessInProduction);
        }
        Ok(Self { _private: () })
    }
}

#[async_trait]
impl SandboxBackend for InProcessBackend {
    async fn launch(&self, request: &ExecutionRequest) -> Result<SandboxCall, SandboxError> {
        let command = build_command(request);
        let instance = ProcessInstance::spawn(command)?;
        let mut call = SandboxCall::new(instance);
        call.state = LifecycleState::Running;
        Ok(call)
    }

    async fn wait(&self, call: &mut SandboxCall, timeout: Duration) -> ExecutionResult {
        let instance = call.downcast_mut::<ProcessInstance>();
        let result = instance.wait(timeout).await;
        call.state = LifecycleState::Reaped;
        result
    }

    async fn kill(&self, call: &mut SandboxCall) -> Result<(), SandboxError> {
        let instance = call.downcast_mut::<ProcessInstance>();
        let result = instance.kill(KillReason::Deadline).await;
        call.state = LifecycleState::Killed;
        result
    }

    async fn reap(&self, call: SandboxCall) -> Result<(), SandboxError> {
        call.downcast::<ProcessInstance>().reap().await
    }
}
