//! Remote shell execution for the operator terminal.

use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{info, warn};

use datalink_wire::{ExecCommandData, ExecCommandResultData};

/// Default timeout when the request does not carry one.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Run a shell command, capture combined output, and report exit code
/// and duration. The child is killed when the timeout expires.
pub async fn execute(request: &ExecCommandData) -> ExecCommandResultData {
    let started = Instant::now();
    let mut result = ExecCommandResultData {
        request_id: request.request_id.clone(),
        ..Default::default()
    };

    if request.command.is_empty() {
        result.success = false;
        result.exit_code = -1;
        result.error = Some("command is empty".into());
        return result;
    }

    let timeout = request
        .timeout
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_TIMEOUT);

    info!(command = %request.command, timeout_s = timeout.as_secs(), "executing remote command");

    let mut cmd = shell_command(&request.command);
    cmd.kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output()).await;
    result.duration_ms = started.elapsed().as_millis() as i64;

    match output {
        Err(_) => {
            warn!(command = %request.command, "remote command timed out");
            result.success = false;
            result.exit_code = -1;
            result.error = Some(format!(
                "command timed out after {} seconds",
                timeout.as_secs()
            ));
        }
        Ok(Err(e)) => {
            result.success = false;
            result.exit_code = -1;
            result.error = Some(format!("failed to start command: {}", e));
        }
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));

            result.exit_code = output.status.code().unwrap_or(-1);
            result.success = output.status.success();
            result.output = combined;
            if !result.success {
                result.error = Some(format!("exit code {}", result.exit_code));
            }
        }
    }

    info!(
        command = %request.command,
        exit_code = result.exit_code,
        duration_ms = result.duration_ms,
        "remote command finished"
    );
    result
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/c").arg(command);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str, timeout: Option<u64>) -> ExecCommandData {
        ExecCommandData {
            request_id: "req-1".into(),
            command: command.into(),
            timeout,
        }
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let result = execute(&request("echo hello", None)).await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert!(result.output.contains("hello"));
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_fatal() {
        let result = execute(&request("exit 3", None)).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn timeout_kills_the_child() {
        let result = execute(&request("sleep 5", Some(1))).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert!(result.error.unwrap().contains("timed out"));
        assert!(result.duration_ms < 3000);
    }

    #[tokio::test]
    async fn empty_command_is_rejected() {
        let result = execute(&request("", None)).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
    }
}
