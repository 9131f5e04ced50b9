//! Tool trait, registry, and execution context.
//!
//! Tools are what let the agent act: read and write files, run shell
//! commands, load skills. Each tool implements [`Tool`], is registered
//! in a [`Registry`], and executes against a per-run [`ToolContext`]
//! that carries the working directory, an environment map, and
//! permission switches.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// Env key holding the active skill's name.
pub const ENV_ACTIVE_SKILL_NAME: &str = "ACTIVE_SKILL_NAME";
/// Env key holding the active skill's SKILL.md path.
pub const ENV_ACTIVE_SKILL_PATH: &str = "ACTIVE_SKILL_PATH";
/// Env key holding the active skill's allowed-tools patterns, newline-joined.
pub const ENV_ACTIVE_SKILL_ALLOWED_TOOLS: &str = "ACTIVE_SKILL_ALLOWED_TOOLS";
/// Env key holding the session id consumed by skill template substitution.
pub const ENV_SESSION_ID: &str = "CLAUDE_SESSION_ID";

/// The result of a tool execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl std::fmt::Display) -> Self {
        Self {
            content: content.to_string(),
            is_error: true,
        }
    }
}

/// Permission switches enforced by tools through the context checks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Permissions {
    pub allow_file_read: bool,
    pub allow_file_write: bool,
    pub allow_exec: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            allow_file_read: true,
            allow_file_write: true,
            allow_exec: true,
        }
    }
}

/// Per-run execution context handed to every tool.
///
/// Owned by the loop driver; mutated only on the driver task, by the
/// driver during skill activation and by tools themselves.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub work_dir: PathBuf,
    pub env: HashMap<String, String>,
    pub permissions: Permissions,
}

impl ToolContext {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            env: HashMap::new(),
            permissions: Permissions::default(),
        }
    }

    /// Set an environment value visible to subsequent tool executions.
    pub fn set_env(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.env.insert(key.into(), value.into());
    }

    pub fn env_get(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Resolve a tool-supplied path against the working directory.
    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() || self.work_dir.as_os_str().is_empty() {
            p.to_path_buf()
        } else {
            self.work_dir.join(p)
        }
    }

    pub fn check_file_read(&self) -> Result<(), ToolError> {
        if self.permissions.allow_file_read {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied {
                operation: "file_read".into(),
                reason: "file read is disabled in this context".into(),
            })
        }
    }

    pub fn check_file_write(&self) -> Result<(), ToolError> {
        if self.permissions.allow_file_write {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied {
                operation: "file_write".into(),
                reason: "file write is disabled in this context".into(),
            })
        }
    }

    pub fn check_exec(&self) -> Result<(), ToolError> {
        if self.permissions.allow_exec {
            Ok(())
        } else {
            Err(ToolError::PermissionDenied {
                operation: "exec".into(),
                reason: "command execution is disabled in this context".into(),
            })
        }
    }

    /// Record an activated skill in the environment.
    ///
    /// An empty `allowed_tools` list clears any previous restriction.
    pub fn set_active_skill(&mut self, name: &str, path: &str, allowed_tools: &[String]) {
        self.env
            .insert(ENV_ACTIVE_SKILL_NAME.into(), name.to_string());
        self.env
            .insert(ENV_ACTIVE_SKILL_PATH.into(), path.to_string());
        if allowed_tools.is_empty() {
            self.env.remove(ENV_ACTIVE_SKILL_ALLOWED_TOOLS);
        } else {
            self.env.insert(
                ENV_ACTIVE_SKILL_ALLOWED_TOOLS.into(),
                allowed_tools.join("\n"),
            );
        }
    }

    pub fn clear_active_skill(&mut self) {
        self.env.remove(ENV_ACTIVE_SKILL_NAME);
        self.env.remove(ENV_ACTIVE_SKILL_PATH);
        self.env.remove(ENV_ACTIVE_SKILL_ALLOWED_TOOLS);
    }

    /// The active skill's name, if one has been activated.
    pub fn active_skill_name(&self) -> Option<&str> {
        self.env_get(ENV_ACTIVE_SKILL_NAME)
    }

    /// The newline-joined allowed-tools patterns of the active skill.
    pub fn active_skill_allowed_tools(&self) -> Option<&str> {
        self.env_get(ENV_ACTIVE_SKILL_ALLOWED_TOOLS)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.env_get(ENV_SESSION_ID)
    }
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "read_file", "bash").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn input_schema(&self) -> Value;

    /// Execute the tool against the given context and input.
    async fn execute(
        &self,
        tool_ctx: &mut ToolContext,
        input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a definition for the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

/// A registry of available tools, listed in lexicographic name order.
///
/// Writes happen only during setup; during a run the registry is shared
/// immutably between concurrent agent drivers.
#[derive(Default)]
pub struct Registry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Fails if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Register a tool, panicking on a duplicate name. For setup paths
    /// where a duplicate is a programming error.
    pub fn must_register(&mut self, tool: Arc<dyn Tool>) {
        if let Err(err) = self.register(tool) {
            panic!("{err}");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All tools in lexicographic name order.
    pub fn list(&self) -> Vec<Arc<dyn Tool>> {
        self.tools.values().cloned().collect()
    }

    /// All tool definitions, in the same order as [`Registry::list`].
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn clear(&mut self) {
        self.tools.clear();
    }
}
