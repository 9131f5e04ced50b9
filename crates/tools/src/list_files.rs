//! Directory listing tool.

use async_trait::async_trait;
use serde_json::{Map, Value};

use gearloop_core::{Tool, ToolContext, ToolError, ToolResult};

const DEFAULT_MAX_ENTRIES: usize = 500;

/// List directory entries, sorted, directories suffixed with `/`.
#[derive(Debug, Default)]
pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List the entries of a directory. Defaults to the working directory."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: the working directory)"
                },
                "max_entries": {
                    "type": "integer",
                    "description": "Maximum entries to return (default: 500)"
                }
            }
        })
    }

    async fn execute(
        &self,
        tool_ctx: &mut ToolContext,
        input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        tool_ctx.check_file_read()?;

        let path = input.get("path").and_then(Value::as_str).unwrap_or(".");
        let max_entries = input
            .get("max_entries")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_ENTRIES);

        let resolved = tool_ctx.resolve_path(path);
        let mut read_dir = match tokio::fs::read_dir(&resolved).await {
            Ok(read_dir) => read_dir,
            Err(err) => {
                return Ok(ToolResult::error(format!(
                    "failed to list {}: {err}",
                    resolved.display()
                )))
            }
        };

        let mut entries: Vec<String> = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.path().is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();

        let total = entries.len();
        entries.truncate(max_entries);
        let mut listing = entries.join("\n");
        if total > max_entries {
            listing.push_str(&format!("\n[{} more entries omitted]", total - max_entries));
        }
        if listing.is_empty() {
            listing = "(empty directory)".into();
        }
        Ok(ToolResult::ok(listing))
    }
}
