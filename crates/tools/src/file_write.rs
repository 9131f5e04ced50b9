//! File write tool.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use gearloop_core::{Tool, ToolContext, ToolError, ToolResult};

/// Write a file relative to the working directory, creating parent
/// directories as needed.
#[derive(Debug, Default)]
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, replacing it if it exists. Parent directories are created."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write"
                },
                "content": {
                    "type": "string",
                    "description": "The complete new file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        tool_ctx: &mut ToolContext,
        input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        tool_ctx.check_file_write()?;

        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'path' argument".into()))?;
        let content = input
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'content' argument".into()))?;

        let resolved = tool_ctx.resolve_path(path);
        if let Some(parent) = resolved.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult::error(format!(
                    "failed to create {}: {err}",
                    parent.display()
                )));
            }
        }

        match tokio::fs::write(&resolved, content).await {
            Ok(()) => {
                debug!(path = %resolved.display(), bytes = content.len(), "wrote file");
                Ok(ToolResult::ok(format!(
                    "wrote {} bytes to {path}",
                    content.len()
                )))
            }
            Err(err) => Ok(ToolResult::error(format!(
                "failed to write {}: {err}",
                resolved.display()
            ))),
        }
    }
}
