//! Message and content-block domain types.
//!
//! A conversation is an ordered sequence of [`Message`]s; each message is
//! an ordered sequence of [`ContentBlock`]s. Tool use and tool results are
//! paired through `tool_use.id` / `tool_result.tool_use_id`, and that
//! pairing must survive any context transformation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// Developer-supplied instructions (between system and user).
    Developer,
    /// The end user.
    User,
    /// The model.
    Assistant,
    /// Tool execution output.
    Tool,
}

impl Default for Role {
    fn default() -> Self {
        Role::Assistant
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its turn.
    EndTurn,
    /// The model is requesting tool execution.
    ToolUse,
    /// The response hit the token limit.
    MaxTokens,
    /// A stop sequence was matched.
    StopSequence,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EndTurn => "end_turn",
            Self::ToolUse => "tool_use",
            Self::MaxTokens => "max_tokens",
            Self::StopSequence => "stop_sequence",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text { text: String },

    /// The model asks the system to invoke a named tool.
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Map<String, Value>,
    },

    /// The outcome of one tool execution, referenced by the tool-use id.
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: Map<String, Value>,
    ) -> Self {
        Self::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result(
        tool_use_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
            is_error,
        }
    }

    pub fn is_tool_use(&self) -> bool {
        matches!(self, Self::ToolUse { .. })
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// Create a message with a single text block.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// Concatenation of all text blocks.
    pub fn get_text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(text);
            }
        }
        out
    }

    pub fn has_tool_use(&self) -> bool {
        self.content.iter().any(ContentBlock::is_tool_use)
    }

    /// All tool-use blocks, in message order.
    pub fn tool_uses(&self) -> Vec<ContentBlock> {
        self.content
            .iter()
            .filter(|b| b.is_tool_use())
            .cloned()
            .collect()
    }
}

/// A streaming increment for one content block. Concatenating the `text`
/// of all deltas for a block reconstructs that block's final text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlockDelta {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ContentBlockDelta {
    pub fn text_delta(text: impl Into<String>) -> Self {
        Self {
            kind: "text_delta".into(),
            text: text.into(),
        }
    }
}

/// Token usage counters reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

impl Usage {
    /// Accumulate another usage report into this one.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_message_helpers() {
        let msg = Message::text(Role::User, "hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.get_text(), "hello");
        assert!(!msg.has_tool_use());
        assert!(msg.tool_uses().is_empty());
    }

    #[test]
    fn get_text_concatenates_text_blocks_only() {
        let msg = Message {
            role: Role::Assistant,
            content: vec![
                ContentBlock::text("a"),
                ContentBlock::tool_use("id1", "noop", Map::new()),
                ContentBlock::text("b"),
            ],
        };
        assert_eq!(msg.get_text(), "ab");
        assert!(msg.has_tool_use());
        assert_eq!(msg.tool_uses().len(), 1);
    }

    #[test]
    fn content_block_serialization_is_tagged() {
        let block = ContentBlock::tool_result("tu_1", "ok", false);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["tool_use_id"], "tu_1");

        let back: ContentBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn tool_use_input_defaults_to_empty() {
        let block: ContentBlock =
            serde_json::from_value(json!({"type": "tool_use", "id": "a", "name": "noop"}))
                .unwrap();
        match block {
            ContentBlock::ToolUse { input, .. } => assert!(input.is_empty()),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn stop_reason_roundtrip() {
        for (reason, text) in [
            (StopReason::EndTurn, "\"end_turn\""),
            (StopReason::ToolUse, "\"tool_use\""),
            (StopReason::MaxTokens, "\"max_tokens\""),
            (StopReason::StopSequence, "\"stop_sequence\""),
        ] {
            assert_eq!(serde_json::to_string(&reason).unwrap(), text);
        }
    }

    #[test]
    fn usage_accumulates() {
        let mut usage = Usage::default();
        usage.add(Usage {
            input_tokens: 10,
            output_tokens: 5,
        });
        usage.add(Usage {
            input_tokens: 3,
            output_tokens: 2,
        });
        assert_eq!(usage.input_tokens, 13);
        assert_eq!(usage.output_tokens, 7);
    }
}
