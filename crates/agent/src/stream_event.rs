//! Typed streaming events emitted by `ExecuteStream`.
//!
//! Per run, events arrive in the order
//! `agent_start < deltas < message_end < [tool events ...] < agent_end`;
//! a cancelled or failed run omits `agent_end`.

use serde::{Deserialize, Serialize};

use crate::api_agent::ExecutionUsage;

/// A structured streaming event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// The run started.
    AgentStart,

    /// Incremental model text.
    MessageDelta { delta: String },

    /// One assistant message completed. Concatenating the deltas since
    /// the previous boundary reconstructs `message`.
    MessageEnd { message: String },

    /// The agent is invoking a tool.
    ToolCall { tool_name: String },

    /// A tool execution completed.
    ToolResult { tool_name: String, is_error: bool },

    /// Steering messages were injected.
    SteeringApplied { count: usize },

    /// Follow-up messages were injected.
    FollowupApplied { count: usize },

    /// The run completed; carries the final message and usage.
    AgentEnd {
        message: String,
        usage: ExecutionUsage,
    },
}

impl AgentStreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AgentStart => "agent_start",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageEnd { .. } => "message_end",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::SteeringApplied { .. } => "steering_applied",
            Self::FollowupApplied { .. } => "followup_applied",
            Self::AgentEnd { .. } => "agent_end",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_is_tagged() {
        let event = AgentStreamEvent::MessageDelta {
            delta: "Hel".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"message_delta""#));
        assert!(json.contains(r#""delta":"Hel""#));
    }

    #[test]
    fn followup_tag_has_no_underscore_between_follow_and_up() {
        let event = AgentStreamEvent::FollowupApplied { count: 1 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"followup_applied""#));
    }

    #[test]
    fn event_type_names_match_serde_tags() {
        let events = vec![
            AgentStreamEvent::AgentStart,
            AgentStreamEvent::MessageDelta { delta: "x".into() },
            AgentStreamEvent::MessageEnd {
                message: "x".into(),
            },
            AgentStreamEvent::ToolCall {
                tool_name: "noop".into(),
            },
            AgentStreamEvent::ToolResult {
                tool_name: "noop".into(),
                is_error: false,
            },
            AgentStreamEvent::SteeringApplied { count: 1 },
            AgentStreamEvent::FollowupApplied { count: 1 },
            AgentStreamEvent::AgentEnd {
                message: "done".into(),
                usage: ExecutionUsage::default(),
            },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type(), "{event:?}");
        }
    }

    #[test]
    fn agent_end_has_no_decision_field() {
        let event = AgentStreamEvent::AgentEnd {
            message: "done".into(),
            usage: ExecutionUsage::default(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("decision").is_none());
    }

    #[test]
    fn deserialization_round_trip() {
        let json = r#"{"type":"tool_result","tool_name":"bash","is_error":true}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::ToolResult {
                tool_name,
                is_error,
            } => {
                assert_eq!(tool_name, "bash");
                assert!(is_error);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }
}
