// src/exec/shell.rs

//! Shell command bodies.

use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::TaskError;
use crate::exec::guard::{guarded, CancelToken};

/// Build a shell command appropriate for the platform.
fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

/// Run `command` through the shell and return its captured stdout.
///
/// A non-zero exit status fails the attempt with
/// [`TaskError::CommandFailed`]. If `limit` elapses first, the child is
/// killed (the future owning it is dropped and `kill_on_drop` is set).
pub async fn run_shell(
    task_id: &str,
    command: &str,
    limit: Option<Duration>,
) -> Result<Value, TaskError> {
    info!(task = %task_id, cmd = %command, "starting task process");

    let mut cmd = shell_command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| TaskError::Spawn(format!("spawning process for task '{task_id}': {e}")))?;

    let cancel = CancelToken::new();
    let wait = async move {
        let output = child.wait_with_output().await.map_err(|e| {
            TaskError::Execution(format!("waiting for process of task '{task_id}': {e}"))
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        for line in stderr.lines() {
            debug!(task = %task_id, "stderr: {}", line);
        }

        let code = output.status.code().unwrap_or(-1);
        info!(
            task = %task_id,
            exit_code = code,
            success = output.status.success(),
            "task process exited"
        );

        if output.status.success() {
            Ok(Value::String(stdout))
        } else {
            Err(TaskError::CommandFailed {
                code,
                stderr: stderr.trim().to_string(),
            })
        }
    };

    guarded(limit, &cancel, wait).await
}
