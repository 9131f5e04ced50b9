//! The public agent facade and stream adapter.
//!
//! [`ApiAgent`] wraps the orchestrator loop behind the stable
//! [`Agent`] contract: `execute` for a blocking run, `execute_stream`
//! for typed event streaming, plus capability reporting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use gearloop_core::{Message, Provider, Registry, Role, Tool, ToolContext};

use crate::compactor::CompactConfig;
use crate::loop_runner::AgentLoop;
use crate::orchestrator::{
    AgentCallbacks, ConvertToLlmHook, LoopError, LoopInputFetcher, OrchestratorRequest,
    OrchestratorResult, TransformContextHook,
};
use crate::state::ToolCallRecord;
use crate::stream_event::AgentStreamEvent;

/// All inputs for one agent execution.
#[derive(Clone, Default)]
pub struct AgentRequest {
    /// The task description or prompt. Required.
    pub task: String,

    /// System prompt override for this request.
    pub system_prompt: String,

    /// Pre-loaded repository instruction content.
    pub repo_instructions: String,

    /// Explicit SOUL file path; `None` discovers one.
    pub soul_file: Option<PathBuf>,

    /// Working directory for tool execution and discovery.
    pub work_dir: PathBuf,

    /// Cancellation token; compose a deadline into it for timeouts.
    pub cancellation: CancellationToken,

    pub options: AgentOptions,
    pub callbacks: AgentCallbacks,
}

/// Per-request execution options.
#[derive(Clone, Default)]
pub struct AgentOptions {
    /// Iteration cap override. Zero keeps the agent default;
    /// non-positive at the orchestrator level means unbounded.
    pub max_iterations: u32,

    /// Removes the iteration cap entirely. Takes precedence over
    /// `max_iterations`.
    pub disable_iteration_limit: bool,

    /// Turns on incremental model output when the provider supports it.
    pub enable_streaming: bool,

    /// Response token cap override. Zero keeps the agent default.
    pub max_tokens: u32,

    /// Pre-LLM context transform hook.
    pub transform_context: Option<TransformContextHook>,

    /// Final agent-to-provider message conversion hook.
    pub convert_to_llm: Option<ConvertToLlmHook>,

    /// Skips the built-in compact/truncate/validate context rules.
    pub disable_default_context_rules: bool,

    /// Advisory timeout; the caller composes it into `cancellation`.
    pub timeout: Option<Duration>,

    /// Restricts the run to these tools. Empty means all registered.
    pub allowed_tools: Vec<String>,

    /// Tools removed from the run.
    pub denied_tools: Vec<String>,

    /// Compaction override; `None` keeps the agent default.
    pub compact_config: Option<CompactConfig>,

    /// High-priority runtime loop inputs.
    pub get_steering_messages: Option<LoopInputFetcher>,

    /// Runtime follow-up loop inputs, applied after steering.
    pub get_follow_up_messages: Option<LoopInputFetcher>,
}

/// The output of one agent execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentResult {
    pub success: bool,

    /// Brief description of what was done (the final text).
    pub summary: String,

    /// The detailed response (the final text).
    pub message: String,

    /// Every tool invocation, in order.
    pub tool_calls: Vec<ToolCallRecord>,

    pub usage: ExecutionUsage,

    /// The complete conversation, for debugging.
    pub raw_output: Vec<Message>,
}

/// Resource usage of one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUsage {
    pub total_iterations: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration: Duration,
}

/// A failed execution, still carrying the structured failure result.
#[derive(Debug)]
pub struct ExecuteError {
    pub error: LoopError,
    pub result: AgentResult,
}

impl std::fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for ExecuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// What an agent can do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub supports_tools: bool,
    pub available_tools: Vec<ToolInfo>,
    pub supports_streaming: bool,
    pub supports_compaction: bool,
    pub max_context_tokens: usize,
    pub provider: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
}

/// The stable consumer-facing agent contract.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run the agent to completion.
    async fn execute(&self, req: AgentRequest) -> Result<AgentResult, ExecuteError>;

    /// Run the agent, emitting typed stream events. The error channel
    /// carries execution failures; both channels close when the run is
    /// over.
    fn execute_stream(
        &self,
        req: AgentRequest,
    ) -> (
        mpsc::UnboundedReceiver<AgentStreamEvent>,
        mpsc::UnboundedReceiver<LoopError>,
    );

    fn capabilities(&self) -> AgentCapabilities;

    /// Release resources.
    fn close(&self) -> Result<(), gearloop_core::Error>;
}

/// Agent-level defaults.
#[derive(Clone, Default)]
pub struct ApiAgentOptions {
    /// Default iteration cap. Zero becomes 50.
    pub max_iterations: u32,

    /// Default conversation window. Zero becomes 50.
    pub max_messages: usize,

    /// Default response token cap. Zero becomes 4096.
    pub max_tokens: u32,

    /// Default system prompt.
    pub system_prompt: String,

    /// Default compaction configuration.
    pub compact_config: Option<CompactConfig>,

    /// Whether streaming execution paths are enabled by default.
    pub enable_streaming: bool,
}

const DEFAULT_MAX_ITERATIONS: u32 = 50;
const DEFAULT_MAX_MESSAGES: usize = 50;
const DEFAULT_MAX_TOKENS: u32 = 4096;
const DEFAULT_MAX_CONTEXT_TOKENS: usize = 200_000;

/// Agent implementation backed by the in-process orchestrator loop.
pub struct ApiAgent {
    provider: Arc<dyn Provider>,
    registry: Arc<Registry>,
    agent_loop: AgentLoop,
    options: ApiAgentOptions,
}

impl ApiAgent {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<Registry>,
        mut options: ApiAgentOptions,
    ) -> Self {
        if options.max_iterations == 0 {
            options.max_iterations = DEFAULT_MAX_ITERATIONS;
        }
        if options.max_messages == 0 {
            options.max_messages = DEFAULT_MAX_MESSAGES;
        }
        if options.max_tokens == 0 {
            options.max_tokens = DEFAULT_MAX_TOKENS;
        }

        let agent_loop = AgentLoop::new(provider.clone(), registry.clone());
        Self {
            provider,
            registry,
            agent_loop,
            options,
        }
    }

    fn build_orchestrator_request(&self, req: AgentRequest) -> OrchestratorRequest {
        let opts = req.options;

        let max_iterations = if opts.max_iterations > 0 {
            opts.max_iterations
        } else {
            self.options.max_iterations
        };
        let max_tokens = if opts.max_tokens > 0 {
            opts.max_tokens
        } else {
            self.options.max_tokens
        };
        let compact_config = opts
            .compact_config
            .or(self.options.compact_config)
            .unwrap_or_default();

        let system_prompt = if req.system_prompt.trim().is_empty() {
            self.options.system_prompt.clone()
        } else {
            req.system_prompt
        };

        let tools = build_tool_override(&self.registry, &opts.allowed_tools, &opts.denied_tools);

        OrchestratorRequest {
            system_prompt,
            repo_instructions: req.repo_instructions,
            instruction_files: Vec::new(),
            soul_file: req.soul_file,
            initial_messages: vec![Message::text(Role::User, req.task)],
            tools,
            max_iterations,
            disable_iteration_limit: opts.disable_iteration_limit,
            max_messages: self.options.max_messages,
            max_tokens: Some(max_tokens),
            compact_config,
            enable_streaming: self.options.enable_streaming || opts.enable_streaming,
            disable_default_context_rules: opts.disable_default_context_rules,
            work_dir: req.work_dir.clone(),
            tool_context: Some(ToolContext::new(&req.work_dir)),
            cancellation: req.cancellation,
            get_steering_messages: opts.get_steering_messages,
            get_follow_up_messages: opts.get_follow_up_messages,
            transform_context: opts.transform_context,
            convert_to_llm: opts.convert_to_llm,
            callbacks: req.callbacks,
        }
    }
}

#[async_trait]
impl Agent for ApiAgent {
    async fn execute(&self, req: AgentRequest) -> Result<AgentResult, ExecuteError> {
        let started = Instant::now();
        info!(
            work_dir = %req.work_dir.display(),
            task_len = req.task.len(),
            "starting execution"
        );

        let orch_req = self.build_orchestrator_request(req);
        match self.agent_loop.run(orch_req).await {
            Ok(result) => {
                let result = convert_orchestrator_result(result, started);
                info!(
                    iterations = result.usage.total_iterations,
                    tool_calls = result.tool_calls.len(),
                    "execution complete"
                );
                Ok(result)
            }
            Err(failure) => {
                error!(error = %failure.error, "orchestrator failed");
                let mut result = convert_orchestrator_result(failure.partial, started);
                result.success = false;
                result.summary = String::new();
                result.message = format!("orchestrator error: {}", failure.error);
                Err(ExecuteError {
                    error: failure.error,
                    result,
                })
            }
        }
    }

    fn execute_stream(
        &self,
        req: AgentRequest,
    ) -> (
        mpsc::UnboundedReceiver<AgentStreamEvent>,
        mpsc::UnboundedReceiver<LoopError>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        if !(self.options.enable_streaming || req.options.enable_streaming) {
            let _ = err_tx.send(LoopError::StreamingDisabled);
            return (event_rx, err_rx);
        }

        let mut req = req;
        req.options.enable_streaming = true;
        wrap_callbacks_into_events(&mut req.callbacks, &event_tx);

        let orch_req = self.build_orchestrator_request(req);
        let agent_loop = self.agent_loop.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let _ = event_tx.send(AgentStreamEvent::AgentStart);

            match agent_loop.run(orch_req).await {
                Ok(result) => {
                    let message = result.final_text();
                    let usage = usage_of(&result, started);
                    let _ = event_tx.send(AgentStreamEvent::AgentEnd { message, usage });
                }
                Err(failure) => {
                    // Cancellation closes both channels with no
                    // agent_end and no error event.
                    if !matches!(failure.error, LoopError::Cancelled) {
                        let _ = err_tx.send(failure.error);
                    }
                }
            }
        });

        (event_rx, err_rx)
    }

    fn capabilities(&self) -> AgentCapabilities {
        let available_tools = self
            .registry
            .list()
            .into_iter()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect::<Vec<_>>();

        AgentCapabilities {
            supports_tools: !available_tools.is_empty(),
            available_tools,
            supports_streaming: self.options.enable_streaming
                && self.provider.supports_streaming(),
            supports_compaction: true,
            max_context_tokens: DEFAULT_MAX_CONTEXT_TOKENS,
            provider: self.provider.name().to_string(),
        }
    }

    fn close(&self) -> Result<(), gearloop_core::Error> {
        Ok(())
    }
}

/// Per-request tool list when an allow/deny filter is set.
fn build_tool_override(
    registry: &Registry,
    allowed: &[String],
    denied: &[String],
) -> Option<Vec<Arc<dyn Tool>>> {
    if allowed.is_empty() && denied.is_empty() {
        return None;
    }
    let tools = registry
        .list()
        .into_iter()
        .filter(|t| {
            let name = t.name();
            (allowed.is_empty() || allowed.iter().any(|a| a == name))
                && !denied.iter().any(|d| d == name)
        })
        .collect();
    Some(tools)
}

fn usage_of(result: &OrchestratorResult, started: Instant) -> ExecutionUsage {
    ExecutionUsage {
        total_iterations: result.total_iterations,
        total_input_tokens: result.total_input_tokens,
        total_output_tokens: result.total_output_tokens,
        total_duration: started.elapsed(),
    }
}

fn convert_orchestrator_result(result: OrchestratorResult, started: Instant) -> AgentResult {
    let usage = usage_of(&result, started);
    let final_text = result.final_text();
    AgentResult {
        success: true,
        summary: final_text.clone(),
        message: final_text,
        tool_calls: result.tool_calls,
        usage,
        raw_output: result.messages,
    }
}

/// Wrap request callbacks so every observation also emits a typed
/// stream event. Original callbacks still fire.
fn wrap_callbacks_into_events(
    callbacks: &mut AgentCallbacks,
    event_tx: &mpsc::UnboundedSender<AgentStreamEvent>,
) {
    let orig = callbacks.clone();

    let tx = event_tx.clone();
    let inner = orig.on_stream_delta.clone();
    callbacks.on_stream_delta = Some(Arc::new(move |delta| {
        if let Some(cb) = &inner {
            cb(delta);
        }
        let _ = tx.send(AgentStreamEvent::MessageDelta {
            delta: delta.text.clone(),
        });
    }));

    let tx = event_tx.clone();
    let inner = orig.on_message.clone();
    callbacks.on_message = Some(Arc::new(move |message| {
        if let Some(cb) = &inner {
            cb(message);
        }
        let _ = tx.send(AgentStreamEvent::MessageEnd {
            message: message.get_text(),
        });
    }));

    let tx = event_tx.clone();
    let inner = orig.on_tool_call.clone();
    callbacks.on_tool_call = Some(Arc::new(move |name, input| {
        if let Some(cb) = &inner {
            cb(name, input);
        }
        let _ = tx.send(AgentStreamEvent::ToolCall {
            tool_name: name.to_string(),
        });
    }));

    let tx = event_tx.clone();
    let inner = orig.on_tool_result.clone();
    callbacks.on_tool_result = Some(Arc::new(move |name, result| {
        if let Some(cb) = &inner {
            cb(name, result);
        }
        let _ = tx.send(AgentStreamEvent::ToolResult {
            tool_name: name.to_string(),
            is_error: result.is_error,
        });
    }));

    let tx = event_tx.clone();
    let inner = orig.on_steering_applied.clone();
    callbacks.on_steering_applied = Some(Arc::new(move |messages| {
        if let Some(cb) = &inner {
            cb(messages);
        }
        let _ = tx.send(AgentStreamEvent::SteeringApplied {
            count: messages.len(),
        });
    }));

    let tx = event_tx.clone();
    let inner = orig.on_follow_up_applied.clone();
    callbacks.on_follow_up_applied = Some(Arc::new(move |messages| {
        if let Some(cb) = &inner {
            cb(messages);
        }
        let _ = tx.send(AgentStreamEvent::FollowupApplied {
            count: messages.len(),
        });
    }));
}
