//! Common child-process bookkeeping shared by the syscall-filter and
//! in-process backends: both spawn a real OS process and differ only in
//! which guardrails they apply before `exec`. Trimmed to what a one-shot
//! call needs (no stdin writer, no PTY).

use std::process::Stdio;
use std::time::{Duration, Instant};

use codecell_types::execution::{ExecutionResult, ExecutionStatus, ResourceKind};
use tokio::process::Child;
use tokio::task::JoinHandle;

use crate::error::SandboxError;
use crate::output::{spawn_capture, CapturedOutput, OUTPUT_CAP};

/// The reason this instance was killed by us, as opposed to exiting on its
/// own or being killed by the kernel. `None` until `kill` is called.
#[derive(Debug, Clone, Copy)]
pub enum KillReason {
    Deadline,
    Resource(ResourceKind),
}

pub struct ProcessInstance {
    pub child: Child,
    pub stdout_task: JoinHandle<CapturedOutput>,
    pub stderr_task: JoinHandle<CapturedOutput>,
    pub started_at: Instant,
    pub kill_reason: Option<KillReason>,
}

impl ProcessInstance {
    pub fn spawn(mut command: tokio::process::Command) -> Result<Self, SandboxError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        Ok(Self {
            child,
            stdout_task: spawn_capture(stdout, OUTPUT_CAP),
            stderr_task: spawn_capture(stderr, OUTPUT_CAP),
            started_at: Instant::now(),
            kill_reason: None,
        })
    }

    /// Waits for exit or `timeout`. On timeout, kills the child and reports
    /// `timed_out`. Output is always collected from the (already-draining)
    /// reader tasks regardless of outcome.
    pub async fn wait(&mut self, timeout: Duration) -> ExecutionResult {
        let outcome = tokio::time::timeout(timeout, self.child.wait()).await;

        let (status, exit_code, resource_kind) = match outcome {
            Ok(Ok(exit_status)) => classify_exit(exit_status, self.kill_reason),
            Ok(Err(_)) => (ExecutionStatus::InternalError, None, None),
            Err(_) => {
                self.kill_reason = Some(KillReason::Deadline);
                let _ = self.child.start_kill();
                let _ = self.child.wait().await;
                (ExecutionStatus::TimedOut, None, None)
            }
        };

        let wall_time_ms = self.started_at.elapsed().as_millis() as u64;
        let stdout = wait_capture(&mut self.stdout_task).await;
        let stderr = wait_capture(&mut self.stderr_task).await;

        ExecutionResult {
            status,
            exit_code,
            resource_kind,
            stdout: stdout.bytes,
            stderr: stderr.bytes,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            wall_time_ms,
            peak_memory_bytes: None,
        }
    }

    pub async fn kill(&mut self, reason: KillReason) -> Result<(), SandboxError> {
        self.kill_reason = Some(reason);
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::InvalidInput => Ok(()), // already exited
            Err(err) => Err(SandboxError::Io(err)),
        }
    }

    pub async fn reap(mut self) -> Result<(), SandboxError> {
        let _ = self.child.wait().await;
        self.stdout_task.abort();
        self.stderr_task.abort();
        Ok(())
    }
}

async fn wait_capture(task: &mut JoinHandle<CapturedOutput>) -> CapturedOutput {
    match task.await {
        Ok(captured) => captured,
        Err(_) => CapturedOutput {
            bytes: Vec::new(),
            truncated: false,
        },
    }
}

#[cfg(unix)]
fn classify_exit(
    status: std::process::ExitStatus,
    kill_reason: Option<KillReason>,
) -> (ExecutionStatus, Option<i32>, Option<ResourceKind>) {
    use std::os::unix::process::ExitStatusExt;

    if let Some(signal) = status.signal() {
        return match kill_reason {
            Some(KillReason::Deadline) => (ExecutionStatus::TimedOut, None, None),
            Some(KillReason::Resource(kind)) => {
                (ExecutionStatus::ResourceExceeded, None, Some(kind))
            }
            // Killed by the kernel without us requesting it (OOM killer,
            // rlimit enforcement): SIGKILL/SIGSEGV under a memory rlimit is
            // the common signature; treat any unexplained fatal signal as a
            // resource violation rather than a bare internal error.
            None if signal == libc::SIGKILL || signal == libc::SIGSEGV => {
                (ExecutionStatus::ResourceExceeded, None, Some(ResourceKind::Memory))
            }
            None => (ExecutionStatus::InternalError, None, None),
        };
    }

    (ExecutionStatus::Completed, status.code(), None)
}

#[cfg(not(unix))]
fn classify_exit(
    status: std::process::ExitStatus,
    _kill_reason: Option<KillReason>,
) -> (ExecutionStatus, Option<i32>, Option<ResourceKind>) {
    (ExecutionStatus::Completed, status.code(), None)
}
