//! Orchestrator request/result types, hooks, and errors.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use gearloop_core::{
    ContentBlockDelta, Message, ProviderError, StopReason, Tool, ToolContext, ToolResult,
};
use serde_json::{Map, Value};

use crate::compactor::CompactConfig;
use crate::state::ToolCallRecord;

/// Boxed error for consumer-supplied hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// Hook over the agent-facing message list, run before the default
/// context rules.
pub type TransformContextHook =
    Arc<dyn Fn(Vec<Message>) -> Result<Vec<Message>, HookError> + Send + Sync>;

/// Hook converting agent-facing messages into provider-facing messages.
/// Receives the provider name; the default is identity.
pub type ConvertToLlmHook =
    Arc<dyn Fn(Vec<Message>, &str) -> Result<Vec<Message>, HookError> + Send + Sync>;

/// Synchronous loop-input fetcher, polled at defined checkpoints.
pub type LoopInputFetcher = Arc<dyn Fn(&LoopInputSnapshot) -> Vec<Message> + Send + Sync>;

/// Loop state handed to steering/follow-up fetchers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopInputSnapshot {
    pub iteration: usize,
    pub message_count: usize,
    pub tool_call_count: usize,
    pub last_stop_reason: Option<StopReason>,
}

/// Observation hooks attached to one request. All default to no-ops.
#[derive(Clone, Default)]
pub struct AgentCallbacks {
    pub on_message: Option<Arc<dyn Fn(&Message) + Send + Sync>>,
    pub on_iteration: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    pub on_tool_call: Option<Arc<dyn Fn(&str, &Map<String, Value>) + Send + Sync>>,
    pub on_tool_result: Option<Arc<dyn Fn(&str, &ToolResult) + Send + Sync>>,
    pub on_steering_applied: Option<Arc<dyn Fn(&[Message]) + Send + Sync>>,
    pub on_follow_up_applied: Option<Arc<dyn Fn(&[Message]) + Send + Sync>>,
    pub on_stream_delta: Option<Arc<dyn Fn(&ContentBlockDelta) + Send + Sync>>,
}

/// All inputs for one orchestrator run.
#[derive(Clone, Default)]
pub struct OrchestratorRequest {
    /// The base system prompt.
    pub system_prompt: String,

    /// Pre-loaded repository instruction content. When empty and a work
    /// dir is set, instructions are discovered from the filesystem.
    pub repo_instructions: String,

    /// Overrides the default instruction candidate file names.
    pub instruction_files: Vec<String>,

    /// Explicit SOUL file path; `None` probes work dir then repo root.
    pub soul_file: Option<PathBuf>,

    /// Starting conversation messages.
    pub initial_messages: Vec<Message>,

    /// Per-run tool list override. `None` uses the shared registry.
    pub tools: Option<Vec<Arc<dyn Tool>>>,

    /// Iteration cap. Non-positive means unbounded.
    pub max_iterations: u32,

    /// Forces an unbounded run; takes precedence over `max_iterations`.
    pub disable_iteration_limit: bool,

    /// Conversation window cap for truncation. Zero means the default.
    pub max_messages: usize,

    /// Response token cap forwarded to the provider.
    pub max_tokens: Option<u32>,

    /// Context compaction configuration.
    pub compact_config: CompactConfig,

    /// Use provider streaming when supported.
    pub enable_streaming: bool,

    /// Skips the built-in compact/truncate/validate rules, leaving only
    /// the user transform.
    pub disable_default_context_rules: bool,

    /// Working directory for instruction/skill discovery and tools.
    pub work_dir: PathBuf,

    /// Execution context for tools. `None` builds one from `work_dir`.
    pub tool_context: Option<ToolContext>,

    /// Cancellation token; callers compose deadlines into it.
    pub cancellation: CancellationToken,

    /// High-priority runtime messages that steer the next turn.
    pub get_steering_messages: Option<LoopInputFetcher>,

    /// Runtime follow-up messages appended after steering.
    pub get_follow_up_messages: Option<LoopInputFetcher>,

    /// Pre-LLM hook over the agent-facing message list.
    pub transform_context: Option<TransformContextHook>,

    /// Final conversion hook before the provider call.
    pub convert_to_llm: Option<ConvertToLlmHook>,

    pub callbacks: AgentCallbacks,
}

/// The output of one orchestrator run.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    /// The last assistant message.
    pub final_message: Message,

    /// The full conversation history.
    pub messages: Vec<Message>,

    pub total_iterations: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,

    /// All tool calls made during execution, in order.
    pub tool_calls: Vec<ToolCallRecord>,
}

impl Default for OrchestratorResult {
    fn default() -> Self {
        Self {
            final_message: Message {
                role: gearloop_core::Role::Assistant,
                content: Vec::new(),
            },
            messages: Vec::new(),
            total_iterations: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            tool_calls: Vec::new(),
        }
    }
}

impl OrchestratorResult {
    /// The final text response.
    pub fn final_text(&self) -> String {
        self.final_message.get_text()
    }
}

/// Why a loop run stopped without a normal completion.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("agent call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("max tokens reached")]
    MaxTokensReached,

    #[error("max iterations ({0}) reached")]
    IterationLimit(usize),

    #[error("execution cancelled")]
    Cancelled,

    #[error("transform context failed: {0}")]
    TransformContext(HookError),

    #[error("convert to llm failed: {0}")]
    ConvertToLlm(HookError),

    #[error("streaming is disabled: enable it on the agent or the request")]
    StreamingDisabled,
}

/// A failed run, still carrying the partial state snapshot.
#[derive(Debug)]
pub struct LoopFailure {
    pub error: LoopError,
    pub partial: OrchestratorResult,
}

impl std::fmt::Display for LoopFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for LoopFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
