//! Shared test doubles for the agent loop suites.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use gearloop_agent::{AgentStreamEvent, LoopError};
use gearloop_core::{
    ContentBlock, ContentBlockDelta, DeltaSink, Provider, ProviderError, ProviderRequest,
    ProviderResponse, Role, StopReason, Tool, ToolContext, ToolError, ToolResult, Usage,
};

pub fn end_turn(text: &str) -> ProviderResponse {
    ProviderResponse {
        role: Role::Assistant,
        stop_reason: StopReason::EndTurn,
        content: vec![ContentBlock::text(text)],
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
        reasoning: None,
    }
}

pub fn tool_use_response(uses: &[(&str, &str)]) -> ProviderResponse {
    ProviderResponse {
        role: Role::Assistant,
        stop_reason: StopReason::ToolUse,
        content: uses
            .iter()
            .map(|(id, name)| ContentBlock::tool_use(*id, *name, Map::new()))
            .collect(),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
        reasoning: None,
    }
}

/// Replays a fixed script of responses, then keeps answering
/// `end_turn "done"`. Records every request it receives.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    pub requests: Mutex<Vec<ProviderRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn request_at(&self, idx: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| end_turn("done")))
    }
}

/// Always fails.
pub struct ErrorProvider;

#[async_trait]
impl Provider for ErrorProvider {
    fn name(&self) -> &str {
        "error"
    }

    async fn call(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("provider boom".into()))
    }
}

/// Streams its text in two deltas, then returns the full message.
pub struct StreamingProvider {
    pub text: String,
}

#[async_trait]
impl Provider for StreamingProvider {
    fn name(&self) -> &str {
        "streaming"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn call(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Ok(end_turn(&self.text))
    }

    async fn stream(
        &self,
        _request: ProviderRequest,
        on_delta: DeltaSink<'_>,
    ) -> Result<ProviderResponse, ProviderError> {
        let mid = self.text.len() / 2;
        on_delta(ContentBlockDelta::text_delta(&self.text[..mid]));
        on_delta(ContentBlockDelta::text_delta(&self.text[mid..]));
        Ok(end_turn(&self.text))
    }
}

/// Counts executions and returns a fixed payload.
pub struct CountingTool {
    name: String,
    output: String,
    pub executions: AtomicUsize,
}

impl CountingTool {
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            executions: AtomicUsize::new(0),
        }
    }

    pub fn execution_count(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for CountingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "counting test tool"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(
        &self,
        _tool_ctx: &mut ToolContext,
        _input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult::ok(&self.output))
    }
}

/// Reports the active skill recorded in the tool context.
pub struct ActiveSkillProbeTool;

#[async_trait]
impl Tool for ActiveSkillProbeTool {
    fn name(&self) -> &str {
        "active_skill_probe"
    }

    fn description(&self) -> &str {
        "reports the active skill name"
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(
        &self,
        tool_ctx: &mut ToolContext,
        _input: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::ok(
            tool_ctx.active_skill_name().unwrap_or("<none>"),
        ))
    }
}

/// Drain both stream channels until they close.
pub async fn collect_stream(
    mut events: UnboundedReceiver<AgentStreamEvent>,
    mut errors: UnboundedReceiver<LoopError>,
) -> (Vec<AgentStreamEvent>, Vec<LoopError>) {
    let mut collected_events = Vec::new();
    let mut collected_errors = Vec::new();
    let deadline = tokio::time::sleep(std::time::Duration::from_secs(2));
    tokio::pin!(deadline);

    let mut events_open = true;
    let mut errors_open = true;
    while events_open || errors_open {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => collected_events.push(event),
                None => events_open = false,
            },
            error = errors.recv(), if errors_open => match error {
                Some(error) => collected_errors.push(error),
                None => errors_open = false,
            },
            _ = &mut deadline => panic!("timed out collecting stream output"),
        }
    }

    (collected_events, collected_errors)
}

pub fn event_index(events: &[AgentStreamEvent], event_type: &str) -> Option<usize> {
    events.iter().position(|e| e.event_type() == event_type)
}
