//! Loop state owned by one orchestrator run.

use gearloop_core::{Message, ProviderResponse, Role, ToolResult, Usage};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::orchestrator::OrchestratorResult;

/// One recorded tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub input: Map<String, Value>,
    pub result: ToolResult,
}

/// Mutable state of a single agent loop run.
///
/// Owned by the loop driver; never exposed before the run returns.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub messages: Vec<Message>,
    pub iterations: usize,
    pub tool_calls: Vec<ToolCallRecord>,
    pub last_response: Option<ProviderResponse>,
    pub usage: Usage,
}

impl LoopState {
    pub fn new(initial_messages: Vec<Message>) -> Self {
        Self {
            messages: initial_messages,
            ..Default::default()
        }
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn add_tool_call(&mut self, name: &str, input: &Map<String, Value>, result: &ToolResult) {
        self.tool_calls.push(ToolCallRecord {
            name: name.to_string(),
            input: input.clone(),
            result: result.clone(),
        });
    }

    pub fn increment_iteration(&mut self) {
        self.iterations += 1;
    }

    pub fn update_usage(&mut self, usage: Usage) {
        self.usage.add(usage);
    }

    /// Snapshot the state into a result. Used at every exit path, so a
    /// failed or cancelled run still reports partial progress.
    pub fn to_result(&self) -> OrchestratorResult {
        let final_message = self
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .cloned()
            .unwrap_or(Message {
                role: Role::Assistant,
                content: Vec::new(),
            });

        OrchestratorResult {
            final_message,
            messages: self.messages.clone(),
            total_iterations: self.iterations,
            total_input_tokens: self.usage.input_tokens,
            total_output_tokens: self.usage.output_tokens,
            tool_calls: self.tool_calls.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gearloop_core::ContentBlock;

    #[test]
    fn to_result_finds_last_assistant_message() {
        let mut state = LoopState::new(vec![Message::text(Role::User, "task")]);
        state.add_message(Message::text(Role::Assistant, "first"));
        state.add_message(Message {
            role: Role::User,
            content: vec![ContentBlock::tool_result("tu_1", "ok", false)],
        });
        state.add_message(Message::text(Role::Assistant, "final"));

        let result = state.to_result();
        assert_eq!(result.final_text(), "final");
        assert_eq!(result.messages.len(), 4);
    }

    #[test]
    fn to_result_without_assistant_is_empty() {
        let state = LoopState::new(vec![Message::text(Role::User, "task")]);
        let result = state.to_result();
        assert_eq!(result.final_text(), "");
        assert_eq!(result.total_iterations, 0);
    }

    #[test]
    fn usage_and_tool_calls_accumulate() {
        let mut state = LoopState::default();
        state.update_usage(Usage {
            input_tokens: 10,
            output_tokens: 4,
        });
        state.update_usage(Usage {
            input_tokens: 7,
            output_tokens: 2,
        });
        state.add_tool_call("noop", &Map::new(), &ToolResult::ok("done"));

        let result = state.to_result();
        assert_eq!(result.total_input_tokens, 17);
        assert_eq!(result.total_output_tokens, 6);
        assert_eq!(result.tool_calls.len(), 1);
    }
}
