//! Context compaction — summarizing older history into a synthetic
//! assistant message so long conversations stay within context bounds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use gearloop_core::{
    ContentBlock, Message, Provider, ProviderError, ProviderRequest, Role,
};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a conversation summarizer. Produce a concise \
summary of the conversation transcript you are given. Preserve task goals, decisions made, \
file paths touched, and any unresolved questions. Respond with the summary text only.";

/// Compaction configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactConfig {
    /// Turns compaction on.
    #[serde(default)]
    pub enabled: bool,

    /// Compact when the message count exceeds this.
    #[serde(default)]
    pub threshold: usize,

    /// Number of recent messages kept verbatim.
    #[serde(default)]
    pub keep_recent: usize,
}

/// Summarizes older history through the provider.
pub struct Compactor {
    provider: Arc<dyn Provider>,
    config: CompactConfig,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, config: CompactConfig) -> Self {
        Self { provider, config }
    }

    pub fn should_compact(&self, messages: &[Message]) -> bool {
        self.config.enabled && messages.len() > self.config.threshold
    }

    /// Replace older messages with a synthetic summary, keeping the last
    /// `keep_recent` verbatim. Errors leave the caller to fall back to
    /// the original list.
    pub async fn compact(&self, messages: &[Message]) -> Result<Vec<Message>, ProviderError> {
        let keep = self.config.keep_recent.min(messages.len());
        let split = messages.len() - keep;
        let (prefix, tail) = messages.split_at(split);
        if prefix.is_empty() {
            return Ok(messages.to_vec());
        }

        let transcript = render_transcript(prefix);
        let request = ProviderRequest {
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            messages: vec![Message::text(
                Role::User,
                format!("Summarize this conversation so far:\n\n{transcript}"),
            )],
            ..Default::default()
        };

        let response = self.provider.call(request).await?;
        let summary = response.get_text().trim().to_string();
        debug!(
            summarized = prefix.len(),
            kept = tail.len(),
            "compacted conversation prefix"
        );

        let mut out = Vec::with_capacity(tail.len() + 1);
        out.push(Message::text(
            Role::Assistant,
            format!("[Conversation summary]\n{summary}"),
        ));
        out.extend(tail.iter().cloned());
        Ok(out)
    }
}

/// Flatten messages into a plain-text transcript for summarization.
fn render_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for message in messages {
        let role = match message.role {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => {
                    out.push_str(role);
                    out.push_str(": ");
                    out.push_str(text);
                    out.push('\n');
                }
                ContentBlock::ToolUse { name, .. } => {
                    out.push_str(role);
                    out.push_str(": [requested tool ");
                    out.push_str(name);
                    out.push_str("]\n");
                }
                ContentBlock::ToolResult {
                    content, is_error, ..
                } => {
                    out.push_str(role);
                    if *is_error {
                        out.push_str(": [tool error] ");
                    } else {
                        out.push_str(": [tool result] ");
                    }
                    out.push_str(content);
                    out.push('\n');
                }
            }
        }
    }
    out
}
