//! Provider trait — the abstraction over LLM backends.
//!
//! A [`Provider`] knows how to send one agent turn (system prompt +
//! messages + tool definitions) to a model and get a response back,
//! either complete or as a stream of content-block deltas. The agent
//! loop calls it without knowing which backend is behind it.
//!
//! Streaming is a capability, not a requirement: the default `stream`
//! implementation falls back to a single `call` and emits no deltas.
//!
//! Adapters must hide one wire quirk: some backends report a plain
//! end-of-turn stop reason while still emitting tool-use blocks. A
//! conforming adapter normalizes that to [`StopReason::ToolUse`] so the
//! loop never skips tool execution.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::message::{ContentBlock, ContentBlockDelta, Message, Role, StopReason, Usage};

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// One agent turn sent to a provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The system prompt.
    #[serde(default)]
    pub system: String,

    /// The conversation messages.
    #[serde(default)]
    pub messages: Vec<Message>,

    /// Tools the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Maximum tokens to generate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Opaque reasoning-effort passthrough for backends that support it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

/// A complete provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub role: Role,

    pub stop_reason: StopReason,

    #[serde(default)]
    pub content: Vec<ContentBlock>,

    #[serde(default)]
    pub usage: Usage,

    /// Model reasoning content, if the backend exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ProviderResponse {
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

    /// All tool-use blocks, in response order.
    pub fn tool_uses(&self) -> Vec<ContentBlock> {
        self.content
            .iter()
            .filter(|b| b.is_tool_use())
            .cloned()
            .collect()
    }

    /// Convert into a conversation message.
    pub fn to_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// Sink for streaming content-block deltas.
pub type DeltaSink<'a> = &'a (dyn Fn(ContentBlockDelta) + Send + Sync);

/// The core Provider trait.
///
/// Implementations are injected by the embedding application; the core
/// ships none. Shared providers must be safe to call from concurrent
/// agent runs.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A stable identifier for this provider (e.g. "claude", "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError>;

    /// Whether [`Provider::stream`] emits incremental deltas.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Send a request and emit incremental deltas via `on_delta`.
    ///
    /// The returned response must equal the delta-reconstructed result.
    /// The default implementation emits nothing and delegates to `call`.
    async fn stream(
        &self,
        request: ProviderRequest,
        on_delta: DeltaSink<'_>,
    ) -> Result<ProviderResponse, ProviderError> {
        let _ = on_delta;
        self.call(request).await
    }
}
