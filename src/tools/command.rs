//! Subprocess execution shared by the command-backed tools.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::debug;

use super::{Environment, ToolOutput};
use crate::error::ToolError;

/// Runs `program` with `args` in `workdir` and waits for it to exit.
///
/// When `env` is given the child sees exactly those variables and nothing
/// inherited from this process.
pub async fn run_command(
    program: &str,
    args: &[String],
    workdir: Option<&Path>,
    env: Option<&Environment>,
) -> Result<ToolOutput, ToolError> {
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = workdir {
        cmd.current_dir(dir);
    }
    if let Some(env) = env {
        cmd.env_clear();
        cmd.envs(env);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!(program, args = ?args, workdir = ?workdir, "Spawning command");

    let output = cmd.output().await.map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let exit_code = output.status.code().unwrap_or(-1);
    debug!(program, exit_code, "Command finished");

    Ok(ToolOutput::new(
        program,
        exit_code,
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        start.elapsed(),
    ))
}
