//! The GearLoop agent loop.
//!
//! The agent follows an iterative tool-use cycle:
//!
//! 1. **Shape context** — user transform, compaction, truncation, and
//!    tool-pair validation over the conversation
//! 2. **Call the provider** — unary or streaming
//! 3. **If tool use**: execute tools in order, append results, loop
//! 4. **If end of turn**: poll steering/follow-up inputs; inject and
//!    continue, or terminate
//!
//! [`ApiAgent`] is the public facade over the loop; [`AgentLoop`] is
//! the orchestrator itself for embedders that need the lower-level
//! contract.

pub mod api_agent;
pub mod compactor;
pub mod loop_runner;
pub mod orchestrator;
pub mod pipeline;
pub mod state;
pub mod stream_event;

pub use api_agent::{
    Agent, AgentCapabilities, AgentOptions, AgentRequest, AgentResult, ApiAgent, ApiAgentOptions,
    ExecuteError, ExecutionUsage, ToolInfo,
};
pub use compactor::{CompactConfig, Compactor};
pub use loop_runner::AgentLoop;
pub use orchestrator::{
    AgentCallbacks, ConvertToLlmHook, HookError, LoopError, LoopFailure, LoopInputFetcher,
    LoopInputSnapshot, OrchestratorRequest, OrchestratorResult, TransformContextHook,
};
pub use pipeline::{truncate_messages, validate_tool_pairs};
pub use state::{LoopState, ToolCallRecord};
pub use stream_event::AgentStreamEvent;
