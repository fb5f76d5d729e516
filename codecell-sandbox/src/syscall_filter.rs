//! Fallback tier for hosts without a container runtime: a forked process
//! carrying rlimits instead of cgroups, and a polling task standing in for
//! the memory/PIDs controllers the container tier gets from the kernel for
//! free. Weaker than the container tier but portable, per the
//! specification's explicit tradeoff for this backend.

use std::time::Duration;

use async_trait::async_trait;
use codecell_types::execution::{ExecutionRequest, ExecutionResult, ResourceKind};
use tokio::time::MissedTickBehavior;

use crate::backend::{SandboxBackend, SandboxCall};
use crate::error::SandboxError;
use crate::interpreter::build_command;
use crate::lifecycle::LifecycleState;
use crate::process_instance::{KillReason, ProcessInstance};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Static ceiling for this tier, independent of whatever a caller asks for.
/// rlimits are per-process and the poll loop is cooperative, so a request
/// that already exceeds what this tier can plausibly enforce is rejected
/// before a process is ever spawned rather than left to the poll loop to
/// catch after the fact.
const MAX_MEMORY_BYTES: u64 = 4 * 1024 * 1024 * 1024;
const MAX_PROCESSES: u32 = 512;

pub struct SyscallFilterBackend;

impl SyscallFilterBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SyscallFilterBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Downcast target for this backend's `SandboxCall`. `Rejected` carries no
/// process: `launch` never spawned one.
enum SyscallInstance {
    Running {
        process: ProcessInstance,
        memory_bytes: u64,
        process_limit: u32,
    },
    Rejected,
}

#[async_trait]
impl SandboxBackend for SyscallFilterBackend {
    async fn launch(&self, request: &ExecutionRequest) -> Result<SandboxCall, SandboxError> {
        if request.memory_bytes > MAX_MEMORY_BYTES || request.process_limit > MAX_PROCESSES {
            let mut call = SandboxCall::new(SyscallInstance::Rejected);
            call.state = LifecycleState::Killed;
            return Ok(call);
        }

        let mut command = build_command(request);
        apply_rlimits(&mut command, request.memory_bytes, request.process_limit);

        let process = ProcessInstance::spawn(command)?;
        let mut call = SandboxCall::new(SyscallInstance::Running {
            process,
            memory_bytes: request.memory_bytes,
            process_limit: request.process_limit,
        });
        call.state = LifecycleState::Running;
        Ok(call)
    }

    async fn wait(&self, call: &mut SandboxCall, timeout: Duration) -> ExecutionResult {
        let instance = call.downcast_mut::<SyscallInstance>();
        let result = match instance {
            SyscallInstance::Rejected => rejected_result(),
            SyscallInstance::Running {
                process,
                memory_bytes,
                process_limit,
            } => poll_and_wait(process, timeout, *memory_bytes, *process_limit).await,
        };
        call.state = LifecycleState::Reaped;
        result
    }

    async fn kill(&self, call: &mut SandboxCall) -> Result<(), SandboxError> {
        let instance = call.downcast_mut::<SyscallInstance>();
        let result = match instance {
            SyscallInstance::Rejected => Ok(()),
            SyscallInstance::Running { process, .. } => process.kill(KillReason::Deadline).await,
        };
        call.state = LifecycleState::Killed;
        result
    }

    async fn reap(&self, call: SandboxCall) -> Result<(), SandboxError> {
        match call.downcast::<SyscallInstance>() {
            SyscallInstance::Rejected => Ok(()),
            SyscallInstance::Running { process, .. } => process.reap().await,
        }
    }
}

fn rejected_result() -> ExecutionResult {
    ExecutionResult {
        status: codecell_types::execution::ExecutionStatus::Rejected,
        exit_code: None,
        resource_kind: None,
        stdout: Vec::new(),
        stderr: Vec::new(),
        stdout_truncated: false,
        stderr_truncated: false,
        wall_time_ms: 0,
        peak_memory_bytes: None,
    }
}

/// Races the deadline against a periodic resource poll; a rlimit breach
/// surfaces through the child's exit signal, the poll exists to catch
/// breaches the kernel doesn't enforce strictly (e.g. NPROC counted by
/// thread, not process, on some platforms).
async fn poll_and_wait(
    instance: &mut ProcessInstance,
    timeout: Duration,
    memory_bytes: u64,
    process_limit: u32,
) -> ExecutionResult {
    if memory_bytes == u64::MAX && process_limit == u32::MAX {
        return instance.wait(timeout).await;
    }

    let deadline = tokio::time::Instant::now() + timeout;
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = tokio::time::sleep_until(deadline) => {
                return instance.wait(Duration::from_millis(0)).await;
            }
            _ = ticker.tick() => {
                if let Some(pid) = instance.child.id() {
                    if let Some(kind) = over_limit(pid, memory_bytes, process_limit) {
                        let _ = instance.kill(KillReason::Resource(kind)).await;
                    }
                }
            }
        }
    }
}

fn over_limit(pid: u32, memory_bytes: u64, process_limit: u32) -> Option<ResourceKind> {
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    for line in status.lines() {
        if let Some(kb) = line.strip_prefix("VmRSS:") {
            if let Ok(kb) = kb.trim().trim_end_matches(" kB").trim().parse::<u64>() {
                if kb.saturating_mul(1024) > memory_bytes {
                    return Some(ResourceKind::Memory);
                }
            }
        }
        if let Some(count) = line.strip_prefix("Threads:") {
            if let Ok(count) = count.trim().parse::<u32>() {
                if count > process_limit {
                    return Some(ResourceKind::Processes);
                }
            }
        }
    }
    None
}

#[cfg(unix)]
fn apply_rlimits(command: &mut tokio::process::Command, memory_bytes: u64, process_limit: u32) {
    unsafe {
        command.pre_exec(move || {
            let as_limit = libc::rlimit {
                rlim_cur: memory_bytes,
                rlim_max: memory_bytes,
            };
            libc::setrlimit(libc::RLIMIT_AS, &as_limit);

            let nproc_limit = libc::rlimit {
                rlim_cur: process_limit as libc::rlim_t,
                rlim_max: process_limit as libc::rlim_t,
            };
            libc::setrlimit(libc::RLIMIT_NPROC, &nproc_limit);

            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_rlimits(_command: &mut tokio::process::Command, _memory_bytes: u64, _process_limit: u32) {}
