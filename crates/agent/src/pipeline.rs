//! The context pipeline — transforms run against the message list
//! before every provider call, in fixed order:
//!
//! 1. the consumer's `transform_context` hook;
//! 2. compaction (persisted back into loop state);
//! 3. truncation with tool-pair dependency closure;
//! 4. tool-pair validation, falling back to the full history.
//!
//! `disable_default_context_rules` skips everything but the user hook.

use std::collections::HashSet;

use tracing::{debug, warn};

use gearloop_core::{ContentBlock, Message};

use crate::compactor::Compactor;
use crate::orchestrator::{LoopError, OrchestratorRequest};
use crate::state::LoopState;

/// Bound on truncation fixed-point passes.
const MAX_CLOSURE_PASSES: usize = 100;

/// Run the transform pipeline for one turn.
///
/// Returns the message list to send; compaction mutates
/// `state.messages` so later turns start from the compacted history.
pub(crate) async fn run_context_pipeline(
    req: &OrchestratorRequest,
    state: &mut LoopState,
    compactor: Option<&Compactor>,
    max_messages: usize,
) -> Result<Vec<Message>, LoopError> {
    let mut current = state.messages.clone();

    if let Some(hook) = &req.transform_context {
        current = hook(current).map_err(LoopError::TransformContext)?;
    }

    if req.disable_default_context_rules {
        return Ok(current);
    }

    if let Some(compactor) = compactor {
        if compactor.should_compact(&current) {
            debug!(
                messages = current.len(),
                "triggering compaction: message count exceeds threshold"
            );
            match compactor.compact(&current).await {
                Ok(compacted) => {
                    debug!(messages = compacted.len(), "compaction succeeded");
                    // Compaction must persist for subsequent turns.
                    state.messages = compacted.clone();
                    current = compacted;
                }
                Err(err) => {
                    warn!(error = %err, "compaction failed, falling back to truncation");
                }
            }
        }
    }

    if current.len() > max_messages {
        current = truncate_messages(current, max_messages);
    }

    if let Err(err) = validate_tool_pairs(&current) {
        warn!(error = %err, "message validation failed, falling back to full history");
        current = state.messages.clone();
    }

    Ok(current)
}

/// Check that every tool_result references a tool_use present in the
/// same window. Returns a description of the orphans on failure.
pub fn validate_tool_pairs(messages: &[Message]) -> Result<(), String> {
    let mut tool_use_ids: HashSet<&str> = HashSet::new();
    for message in messages {
        for block in &message.content {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                if id.is_empty() {
                    warn!(tool = %name, "tool_use has empty id");
                } else {
                    tool_use_ids.insert(id);
                }
            }
        }
    }

    let mut orphans: Vec<String> = Vec::new();
    for (idx, message) in messages.iter().enumerate() {
        for block in &message.content {
            if let ContentBlock::ToolResult { tool_use_id, .. } = block {
                if tool_use_id.is_empty() {
                    orphans.push(format!("msg[{idx}]:empty_id"));
                } else if !tool_use_ids.contains(tool_use_id.as_str()) {
                    orphans.push(format!("msg[{idx}]:{tool_use_id}"));
                }
            }
        }
    }

    if orphans.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "found {} orphaned tool_results: {}",
            orphans.len(),
            orphans.join(", ")
        ))
    }
}

/// Truncate history to roughly `max_messages`, always keeping the first
/// message and extending the retention window backwards until every
/// retained tool_result has its tool_use in the window (fixed-point
/// iteration with a safety bound).
pub fn truncate_messages(messages: Vec<Message>, max_messages: usize) -> Vec<Message> {
    if messages.len() <= max_messages {
        return messages;
    }

    // Ideal cut point: keep the first message plus the most recent tail.
    let mut keep_from = (messages.len() - max_messages + 1).max(1);

    let collect_tool_use_ids = |from: usize| -> HashSet<String> {
        let mut ids = HashSet::new();
        let mut scan = |message: &Message| {
            for block in &message.content {
                if let ContentBlock::ToolUse { id, .. } = block {
                    if !id.is_empty() {
                        ids.insert(id.clone());
                    }
                }
            }
        };
        // The first message is always kept.
        scan(&messages[0]);
        for message in &messages[from..] {
            scan(message);
        }
        ids
    };

    for _pass in 0..MAX_CLOSURE_PASSES {
        let mut changed = false;
        let ids = collect_tool_use_ids(keep_from);

        'scan: for i in keep_from..messages.len() {
            for block in &messages[i].content {
                let ContentBlock::ToolResult { tool_use_id, .. } = block else {
                    continue;
                };
                if tool_use_id.is_empty() || ids.contains(tool_use_id) {
                    continue;
                }
                // Pull the window back to the message carrying the
                // referenced tool_use.
                for j in (1..keep_from).rev() {
                    let found = messages[j].content.iter().any(|b| {
                        matches!(b, ContentBlock::ToolUse { id, .. } if id == tool_use_id)
                    });
                    if found {
                        debug!(
                            kept_from = j,
                            tool_use_id = %tool_use_id,
                            needed_by = i,
                            "truncation: extending window to preserve tool pair"
                        );
                        keep_from = j;
                        changed = true;
                        break 'scan;
                    }
                }
            }
        }

        if !changed {
            break;
        }
    }

    // Final orphan check; truncation proceeds but the gap is logged.
    let ids = collect_tool_use_ids(keep_from);
    let window: Vec<&Message> = std::iter::once(&messages[0])
        .chain(messages[keep_from..].iter())
        .collect();
    for message in window {
        for block in &message.content {
            if let ContentBlock::ToolResult { tool_use_id, .. } = block {
                if tool_use_id.is_empty() || !ids.contains(tool_use_id) {
                    warn!(
                        tool_use_id = %tool_use_id,
                        "truncation left an orphaned tool_result"
                    );
                }
            }
        }
    }

    let mut result = Vec::with_capacity(messages.len() - keep_from + 1);
    result.push(messages[0].clone());
    result.extend_from_slice(&messages[keep_from..]);

    debug!(
        before = messages.len(),
        after = result.len(),
        "truncated message history"
    );
    result
}
