//! Turns a materialized [`ExecutionRequest`] into the command line every
//! backend spawns. The sandbox interprets `code` as a POSIX shell script
//! so every tier shares one spawn path regardless of what language the
//! capability template actually generated.

use codecell_types::execution::ExecutionRequest;
use tokio::process::Command;

pub const SHELL: &str = "/bin/sh";

pub fn build_command(request: &ExecutionRequest) -> Command {
    let mut command = Command::new(SHELL);
    command.arg("-c").arg(&request.code);
    command.current_dir(&request.workdir);
    command.env_clear();
    command.env("PATH", "/usr/bin:/bin");
    command.kill_on_drop(true);
    command
}
