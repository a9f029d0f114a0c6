//! shell: run a command through the user's shell with streaming output.
//!
//! Output lines are handed to the caller as they arrive. The child is
//! killed when the cancellation token fires or the timeout elapses.

use keel_core::error::ToolError;
use keel_core::tool::{ToolDefinition, names};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_SHELL_TIMEOUT_MS: u64 = 30_000;

pub fn shell_definition() -> ToolDefinition {
    ToolDefinition {
        name: names::SHELL.into(),
        description: "Execute a shell command and return stdout/stderr. Commands should be \
                      compatible with the current platform shell."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in milliseconds (default: 30000)"
                }
            },
            "required": ["command"]
        }),
    }
}

/// The shell `shell` calls run in: `powershell.exe` on Windows, else
/// `$SHELL` with a `/bin/sh` fallback.
pub fn shell_program() -> String {
    if cfg!(target_os = "windows") {
        return "powershell.exe".into();
    }
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "/bin/sh".into())
}

/// Platform shell invocation for `command`.
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new(shell_program());
    if cfg!(target_os = "windows") {
        cmd.args(["-NoProfile", "-Command", command]);
    } else {
        cmd.args(["-c", command]);
    }
    cmd
}

enum Exit {
    Finished(Option<i32>),
    TimedOut,
    Cancelled,
}

/// Runs `shell` calls in a fixed working directory.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    cwd: PathBuf,
    default_timeout_ms: u64,
}

impl ShellRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            default_timeout_ms: DEFAULT_SHELL_TIMEOUT_MS,
        }
    }

    pub fn with_default_timeout(mut self, timeout_ms: u64) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    /// Run the command in `input` and return
    /// `exit code: N\n{stdout}\n{stderr}`, trimmed.
    pub async fn run(
        &self,
        input: &serde_json::Value,
        cancel: &CancellationToken,
        on_output: &mut (dyn FnMut(&str) + Send),
    ) -> Result<String, ToolError> {
        let command = input["command"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        let timeout_ms = input["timeout"].as_u64().unwrap_or(self.default_timeout_ms);

        debug!(command = %command, timeout_ms, "Executing shell command");

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: names::SHELL.into(),
            reason,
        };

        let mut child = shell_command(command)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| failed("stdout was not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| failed("stderr was not captured".into()))?;
        let mut stdout_lines = BufReader::new(stdout).split(b'\n');
        let mut stderr_lines = BufReader::new(stderr).split(b'\n');

        let mut out = String::new();
        let mut err = String::new();
        let mut out_open = true;
        let mut err_open = true;

        let deadline = tokio::time::sleep(Duration::from_millis(timeout_ms));
        tokio::pin!(deadline);

        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Exit::Cancelled,
                _ = &mut deadline => break Exit::TimedOut,
                line = stdout_lines.next_segment(), if out_open => match line {
                    Ok(Some(raw)) => push_line(&mut out, &raw, on_output),
                    Ok(None) => out_open = false,
                    Err(e) => {
                        warn!(error = %e, "Failed to read shell stdout");
                        out_open = false;
                    }
                },
                line = stderr_lines.next_segment(), if err_open => match line {
                    Ok(Some(raw)) => push_line(&mut err, &raw, on_output),
                    Ok(None) => err_open = false,
                    Err(e) => {
                        warn!(error = %e, "Failed to read shell stderr");
                        err_open = false;
                    }
                },
                status = child.wait(), if !out_open && !err_open => {
                    break Exit::Finished(status.ok().and_then(|s| s.code()));
                }
            }
        };

        let code = match exit {
            Exit::Finished(code) => code.unwrap_or(-1),
            Exit::Cancelled => {
                let _ = child.kill().await;
                return Err(ToolError::Cancelled(command.into()));
            }
            Exit::TimedOut => {
                warn!(command = %command, timeout_ms, "Shell command timed out");
                let _ = child.kill().await;
                err.push_str(&format!("Command timed out after {timeout_ms}ms"));
                -1
            }
        };

        Ok(format!("exit code: {code}\n{out}\n{err}").trim().to_string())
    }
}

/// Append one raw output line, decoding invalid UTF-8 lossily.
fn push_line(buf: &mut String, raw: &[u8], on_output: &mut (dyn FnMut(&str) + Send)) {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    let line = format!("{}\n", String::from_utf8_lossy(raw));
    on_output(&line);
    buf.push_str(&line);
}
