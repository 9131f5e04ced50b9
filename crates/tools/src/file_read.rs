//! File read tool.

use async_trait::async_trait;
use serde_json::{Map, Value};

use gearloop_core::{Tool, ToolContext, ToolError, ToolResult};

const DEFAULT_MAX_BYTES: usize = 256 * 1024;

/// Read a file relative to the working directory.
#[derive(Debug, Default)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Paths are resolved against the working directory."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Maximum bytes to return (default: 262144)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        tool_ctx: &mut ToolContext,
        input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        tool_ctx.check_file_read()?;

        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing 'path' argument".into()))?;
        let max_bytes = input
            .get("max_bytes")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_BYTES);

        let resolved = tool_ctx.resolve_path(path);
        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) if content.len() > max_bytes => {
                let mut cut = max_bytes;
                while cut > 0 && !content.is_char_boundary(cut) {
                    cut -= 1;
                }
                Ok(ToolResult::ok(format!(
                    "{}\n\n[truncated to {max_bytes} bytes]",
                    &content[..cut]
                )))
            }
            Ok(content) => Ok(ToolResult::ok(content)),
            Err(err) => Ok(ToolResult::error(format!(
                "failed to read {}: {err}",
                resolved.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn input(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn schema_requires_path() {
        let schema = ReadFileTool.input_schema();
        assert_eq!(schema["required"], json!(["path"]));
    }

    #[tokio::test]
    async fn reads_relative_to_work_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("note.txt"), "hello").unwrap();

        let mut ctx = ToolContext::new(dir.path());
        let result = ReadFileTool
            .execute(&mut ctx, &input(&[("path", json!("note.txt"))]))
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content, "hello");
    }

    #[tokio::test]
    async fn missing_file_is_error_result() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ToolContext::new(dir.path());
        let result = ReadFileTool
            .execute(&mut ctx, &input(&[("path", json!("absent.txt"))]))
            .await
            .unwrap();
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn respects_byte_cap() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.txt"), "x".repeat(128)).unwrap();

        let mut ctx = ToolContext::new(dir.path());
        let result = ReadFileTool
            .execute(
                &mut ctx,
                &input(&[("path", json!("big.txt")), ("max_bytes", json!(16))]),
            )
            .await
            .unwrap();
        assert!(result.content.contains("[truncated to 16 bytes]"));
    }

    #[tokio::test]
    async fn denied_when_file_read_forbidden() {
        let dir = TempDir::new().unwrap();
        let mut ctx = ToolContext::new(dir.path());
        ctx.permissions.allow_file_read = false;

        let err = ReadFileTool
            .execute(&mut ctx, &input(&[("path", json!("note.txt"))]))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
