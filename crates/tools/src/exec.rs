//! Running approved commands through the shell.

use std::process::Stdio;

use kubeinteract_core::error::ToolError;
use kubeinteract_core::tool::InvokeToolOptions;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Run `command` with `sh -c` in the session's working directory.
///
/// A non-zero exit is not an error: the exit code and both output streams are
/// returned so the model can react to them. Only a failure to run the command
/// at all is reported as [`ToolError::ExecutionFailed`].
pub async fn run_shell(
    tool_name: &str,
    command: &str,
    cancel: &CancellationToken,
    options: &InvokeToolOptions,
) -> Result<String, ToolError> {
    debug!(tool = tool_name, command = %command, "Executing shell command");

    let mut cmd = Command::new("sh");
    cmd.args(["-c", command])
        .stdin(Stdio::null())
        .kill_on_drop(true);

    if !options.work_dir.as_os_str().is_empty() {
        cmd.current_dir(&options.work_dir);
    }
    if let Some(kubeconfig) = &options.kubeconfig {
        cmd.env("KUBECONFIG", kubeconfig);
    }

    let output = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(ToolError::Cancelled(command.to_string()));
        }
        output = cmd.output() => output,
    };

    match output {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();

            let result_text = if output.status.success() {
                if stderr.is_empty() {
                    stdout
                } else {
                    format!("{stdout}\n[stderr]: {stderr}")
                }
            } else {
                let code = output.status.code().unwrap_or(-1);
                warn!(command = %command, exit_code = code, "Command failed");
                format!("[exit code: {code}]\n{stdout}\n{stderr}")
            };

            Ok(result_text.trim().to_string())
        }
        Err(e) => Err(ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options_in(dir: &std::path::Path) -> InvokeToolOptions {
        InvokeToolOptions {
            kubeconfig: Some("/tmp/test-kubeconfig".into()),
            work_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn execute_echo() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_shell("bash", "echo hello", &CancellationToken::new(), &options_in(dir.path()))
            .await
            .unwrap();
        assert_eq!(output, "hello");
    }

    #[tokio::test]
    async fn runs_in_work_dir_with_kubeconfig() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let output = run_shell(
            "bash",
            "ls && echo $KUBECONFIG",
            &CancellationToken::new(),
            &options_in(dir.path()),
        )
        .await
        .unwrap();
        assert!(output.contains("marker.txt"));
        assert!(output.contains("/tmp/test-kubeconfig"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_reported_in_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = run_shell(
            "bash",
            "echo oops >&2; exit 3",
            &CancellationToken::new(),
            &options_in(dir.path()),
        )
        .await
        .unwrap();
        assert!(output.starts_with("[exit code: 3]"));
        assert!(output.contains("oops"));
    }

    #[tokio::test]
    async fn cancelled_before_completion() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run_shell("bash", "sleep 5", &cancel, &options_in(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled(_)));
    }

    #[tokio::test]
    async fn missing_work_dir_fails_to_spawn() {
        let err = run_shell(
            "bash",
            "true",
            &CancellationToken::new(),
            &options_in(std::path::Path::new("/nonexistent/agent-workdir")),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
