//! Skill tools — progressive disclosure over discovered SKILL.md files.
//!
//! `list_skills` surfaces metadata, `read_skill` loads one full body,
//! and `use_skill` activates a skill for the rest of the run (setting
//! the active-skill environment, including its allowed-tools policy).

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use gearloop_core::{Tool, ToolContext, ToolError, ToolResult};
use gearloop_skills as skills;
use gearloop_skills::Skill;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 500;

fn search_paths(input: &Map<String, Value>, tool_ctx: &ToolContext) -> Vec<PathBuf> {
    let explicit = parse_search_paths(input.get("search_paths"));
    if explicit.is_empty() {
        skills::default_search_dirs(&tool_ctx.work_dir)
    } else {
        explicit
    }
}

fn parse_search_paths(value: Option<&Value>) -> Vec<PathBuf> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![PathBuf::from(s.trim())],
        _ => Vec::new(),
    }
}

fn get_usize(input: &Map<String, Value>, key: &str, default: usize) -> usize {
    match input.get(key) {
        Some(Value::Number(n)) => n.as_u64().map(|n| n as usize).unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn display_path(skill: &Skill) -> String {
    skill
        .path
        .to_string_lossy()
        .replace(std::path::MAIN_SEPARATOR, "/")
}

/// List discoverable skills with name, scope, description, and path.
#[derive(Debug, Default)]
pub struct ListSkillsTool;

#[async_trait]
impl Tool for ListSkillsTool {
    fn name(&self) -> &str {
        "list_skills"
    }

    fn description(&self) -> &str {
        "List discoverable skills (name, description, path) from configured skill directories."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Optional case-insensitive filter applied to skill names and descriptions"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of skills to return (default: 100, max: 500)"
                },
                "search_paths": {
                    "type": "array",
                    "description": "Optional explicit directories to scan for skills",
                    "items": { "type": "string" }
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

        let discovered = skills::discover(&search_paths(input, tool_ctx));
        let query = input.get("query").and_then(Value::as_str).unwrap_or("");
        let mut filtered = skills::filter_by_query(&discovered, query);

        let limit = get_usize(input, "limit", DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        if filtered.is_empty() {
            return Ok(ToolResult::ok("No skills found."));
        }
        filtered.truncate(limit);

        let mut out = format!("Found {} skill(s):\n", filtered.len());
        for skill in &filtered {
            out.push_str(&format!(
                "- {} [{}] | {} | {}\n",
                skill.name,
                skill.scope,
                skill.description,
                display_path(skill)
            ));
        }
        Ok(ToolResult::ok(out.trim_end()))
    }
}

/// Read the full SKILL.md content for one skill.
#[derive(Debug, Default)]
pub struct ReadSkillTool;

#[async_trait]
impl Tool for ReadSkillTool {
    fn name(&self) -> &str {
        "read_skill"
    }

    fn description(&self) -> &str {
        "Read the full SKILL.md content by skill name or path."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Skill name from list_skills output"
                },
                "path": {
                    "type": "string",
                    "description": "Optional explicit path to SKILL.md"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Maximum bytes of SKILL.md content to return (default: 65536)"
                },
                "search_paths": {
                    "type": "array",
                    "description": "Optional explicit directories to scan for skills",
                    "items": { "type": "string" }
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

        let discovered = skills::discover(&search_paths(input, tool_ctx));
        if discovered.is_empty() {
            return Ok(ToolResult::error("no skills available"));
        }

        let max_bytes = get_usize(input, "max_bytes", skills::DEFAULT_SKILL_READ_MAX_BYTES);

        let (reference, matches) = match input.get("path").and_then(Value::as_str) {
            Some(raw_path) if !raw_path.trim().is_empty() => {
                let resolved = tool_ctx.resolve_path(raw_path.trim());
                let matches = skills::resolve_by_path(&discovered, &resolved);
                (raw_path.trim().to_string(), matches)
            }
            _ => {
                let name = input.get("name").and_then(Value::as_str).unwrap_or("");
                (name.to_string(), skills::resolve_by_name(&discovered, name))
            }
        };

        if matches.is_empty() {
            return Ok(ToolResult::error(skills::SkillError::NotFound(reference)));
        }
        if matches.len() > 1 {
            return Ok(ToolResult::error(skills::SkillError::Ambiguous(
                skills::join_ambiguous_paths(&matches),
            )));
        }

        let selected = &matches[0];
        let (content, truncated) = match skills::read_file(&selected.path, max_bytes) {
            Ok(read) => read,
            Err(err) => {
                return Ok(ToolResult::error(format!("failed to read skill file: {err}")))
            }
        };

        let mut out = format!(
            "Skill: {}\nPath: {}\n\n{content}",
            selected.name,
            display_path(selected)
        );
        if truncated {
            out.push_str(&format!("\n\n[truncated to {max_bytes} bytes]"));
        }
        Ok(ToolResult::ok(out))
    }
}

/// Activate a skill: render its body and record it (with its
/// allowed-tools policy) in the tool context. Exempt from allowlist
/// enforcement so the model can always switch skills.
#[derive(Debug, Default)]
pub struct UseSkillTool;

#[async_trait]
impl Tool for UseSkillTool {
    fn name(&self) -> &str {
        "use_skill"
    }

    fn description(&self) -> &str {
        "Activate a skill by name: loads its instructions and applies its tool policy for the rest of the run."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "description": "Skill name to activate"
                },
                "arguments": {
                    "type": "string",
                    "description": "Optional arguments substituted into the skill body"
                }
            },
            "required": ["name"]
        })
    }

    async fn execute(
        &self,
        tool_ctx: &mut ToolContext,
        input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        tool_ctx.check_file_read()?;

        let name = input
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing 'name' argument".into()))?;
        let arguments = input
            .get("arguments")
            .and_then(Value::as_str)
            .unwrap_or("");

        let discovered = skills::discover(&skills::default_search_dirs(&tool_ctx.work_dir));
        let selected = match skills::resolve_for_invocation(&discovered, name) {
            Ok(selected) => selected,
            Err(err) => return Ok(ToolResult::error(err)),
        };

        let session_id = tool_ctx.session_id().unwrap_or("").to_string();
        let rendered = match skills::render_for_invocation(
            &selected,
            arguments,
            &session_id,
            skills::DEFAULT_SKILL_READ_MAX_BYTES,
        ) {
            Ok(rendered) => rendered,
            Err(err) => return Ok(ToolResult::error(err)),
        };

        tool_ctx.set_active_skill(
            &selected.name,
            &selected.path.to_string_lossy(),
            &selected.allowed_tools,
        );

        let mut out = format!(
            "Activated skill {} [{}]\n\n{}",
            selected.name, selected.scope, rendered.rendered
        );
        if rendered.truncated {
            out.push_str(&format!(
                "\n\n[truncated to {} bytes]",
                skills::DEFAULT_SKILL_READ_MAX_BYTES
            ));
        }
        Ok(ToolResult::ok(out))
    }
}
