//! Shell tool — run commands in the working directory.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::process::Command;
use tracing::debug;

use gearloop_core::{Tool, ToolContext, ToolError, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Execute a shell command via `bash -lc` in the working directory.
#[derive(Debug, Default)]
pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the working directory and return stdout/stderr."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout_secs": {
                    "type": "integer",
                    "description": "Seconds before the command is killed (default: 120)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(
        &self,
        tool_ctx: &mut ToolContext,
        input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        tool_ctx.check_exec()?;

        let command = input
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'command' argument".into()))?;
        let timeout_secs = input
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        debug!(command = %command, "executing shell command");

        let mut cmd = Command::new("bash");
        cmd.args(["-lc", command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !tool_ctx.work_dir.as_os_str().is_empty() {
            cmd.current_dir(&tool_ctx.work_dir);
        }
        for (key, value) in &tool_ctx.env {
            cmd.env(key, value);
        }

        let output =
            match tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await {
                Err(_) => {
                    return Ok(ToolResult::error(format!(
                        "command timed out after {timeout_secs}s"
                    )))
                }
                Ok(Err(err)) => {
                    return Ok(ToolResult::error(format!("failed to spawn command: {err}")))
                }
                Ok(Ok(output)) => output,
            };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut combined = String::new();
        if !stdout.trim().is_empty() {
            combined.push_str(stdout.trim_end());
        }
        if !stderr.trim().is_empty() {
            if !combined.is_empty() {
                combined.push_str("\n--- stderr ---\n");
            }
            combined.push_str(stderr.trim_end());
        }

        if output.status.success() {
            if combined.is_empty() {
                combined = "(no output)".into();
            }
            Ok(ToolResult::ok(combined))
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".into());
            Ok(ToolResult::error(format!(
                "command exited with status {code}\n{combined}"
            )))
        }
    }
}
