//! The agent loop — one driver task per run.
//!
//! Each turn: run the context pipeline, call the provider, repair
//! tool-use ids, append the assistant message, then dispatch on the
//! stop reason — execute tools, inject loop inputs, or terminate.
//! Termination happens on provider `end_turn` (with no pending loop
//! inputs), on the iteration cap, or on cancellation; a failed or
//! cancelled run still returns the partial state snapshot.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use gearloop_core::{
    ContentBlock, ContentBlockDelta, Message, Provider, ProviderRequest, ProviderResponse,
    Registry, Role, StopReason, Tool, ToolContext, ToolDefinition, ToolError, ToolResult,
};
use gearloop_instructions as instructions;
use gearloop_instructions::soul;
use gearloop_skills as skills;
use gearloop_skills::SkillError;

use crate::compactor::Compactor;
use crate::orchestrator::{
    LoopError, LoopFailure, LoopInputSnapshot, OrchestratorRequest, OrchestratorResult,
};
use crate::pipeline::run_context_pipeline;
use crate::state::LoopState;

const DEFAULT_MAX_MESSAGES: usize = 50;

/// The agent loop orchestrator.
///
/// Holds the shared provider and tool registry; each [`AgentLoop::run`]
/// call owns its state and runs strictly sequentially.
#[derive(Clone)]
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    registry: Arc<Registry>,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, registry: Arc<Registry>) -> Self {
        Self { provider, registry }
    }

    /// Execute the agent loop until completion, a bound, or cancellation.
    pub async fn run(
        &self,
        mut req: OrchestratorRequest,
    ) -> Result<OrchestratorResult, LoopFailure> {
        let mut state = LoopState::new(req.initial_messages.clone());
        let mut tool_ctx = req
            .tool_context
            .take()
            .unwrap_or_else(|| ToolContext::new(&req.work_dir));

        let repo_instructions =
            if req.repo_instructions.trim().is_empty() && !req.work_dir.as_os_str().is_empty() {
                read_repo_instructions(&req.work_dir, &req.instruction_files)
            } else {
                req.repo_instructions.clone()
            };

        let soul_content = read_soul_content(&req.work_dir, req.soul_file.clone());

        // Explicit "/skill args" invocation in the initial user message.
        match apply_slash_skill_invocation(&mut state, &mut tool_ctx, &req.work_dir) {
            Ok(true) => info!("applied explicit slash skill invocation"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "slash skill invocation failed"),
        }

        let run_tools: BTreeMap<String, Arc<dyn Tool>> = match &req.tools {
            Some(list) => list
                .iter()
                .map(|t| (t.name().to_string(), t.clone()))
                .collect(),
            None => self
                .registry
                .list()
                .into_iter()
                .map(|t| (t.name().to_string(), t))
                .collect(),
        };
        let tool_defs: Vec<ToolDefinition> =
            run_tools.values().map(|t| t.to_definition()).collect();
        let tool_names: Vec<&str> = run_tools.keys().map(String::as_str).collect();
        info!(
            work_dir = %req.work_dir.display(),
            tools = ?tool_names,
            max_iterations = req.max_iterations,
            "starting agent loop"
        );

        let system_prompt =
            build_system_prompt(&req.system_prompt, &soul_content, &repo_instructions);
        debug!(chars = system_prompt.len(), "system prompt assembled");

        let has_iteration_limit = !req.disable_iteration_limit && req.max_iterations > 0;
        let max_iterations = req.max_iterations as usize;
        let max_messages = if req.max_messages == 0 {
            DEFAULT_MAX_MESSAGES
        } else {
            req.max_messages
        };

        let compactor = if req.compact_config.enabled {
            info!(
                threshold = req.compact_config.threshold,
                keep_recent = req.compact_config.keep_recent,
                "compaction enabled"
            );
            Some(Compactor::new(self.provider.clone(), req.compact_config))
        } else {
            None
        };

        // Tracks every tool_use id seen this run, to repair duplicates.
        let mut seen_tool_use_ids: HashSet<String> = HashSet::new();

        loop {
            if req.cancellation.is_cancelled() {
                warn!(iteration = state.iterations, "context cancelled");
                return Err(LoopFailure {
                    error: LoopError::Cancelled,
                    partial: state.to_result(),
                });
            }
            if has_iteration_limit && state.iterations >= max_iterations {
                error!(max_iterations, "max iterations reached");
                return Err(LoopFailure {
                    error: LoopError::IterationLimit(max_iterations),
                    partial: state.to_result(),
                });
            }

            state.increment_iteration();
            if let Some(cb) = &req.callbacks.on_iteration {
                cb(state.iterations);
            }
            if has_iteration_limit {
                debug!(iteration = state.iterations, max_iterations, "iteration");
            } else {
                debug!(iteration = state.iterations, "iteration (unbounded)");
            }

            let context_messages =
                match run_context_pipeline(&req, &mut state, compactor.as_ref(), max_messages)
                    .await
                {
                    Ok(messages) => messages,
                    Err(error) => {
                        return Err(LoopFailure {
                            error,
                            partial: state.to_result(),
                        })
                    }
                };

            // Convert agent-context messages into provider-ready messages.
            let llm_messages = match &req.convert_to_llm {
                Some(hook) => match hook(context_messages, self.provider.name()) {
                    Ok(messages) => messages,
                    Err(err) => {
                        return Err(LoopFailure {
                            error: LoopError::ConvertToLlm(err),
                            partial: state.to_result(),
                        })
                    }
                },
                None => context_messages,
            };

            let provider_req = ProviderRequest {
                system: system_prompt.clone(),
                messages: llm_messages,
                tools: tool_defs.clone(),
                max_tokens: req.max_tokens,
                reasoning_effort: None,
            };
            debug!(
                messages = provider_req.messages.len(),
                tools = provider_req.tools.len(),
                "sending provider request"
            );

            let mut resp = match self.call_provider(provider_req, &req).await {
                Ok(resp) => resp,
                Err(error) => {
                    error!(error = %error, "agent call failed");
                    return Err(LoopFailure {
                        error,
                        partial: state.to_result(),
                    });
                }
            };

            info!(
                stop_reason = %resp.stop_reason,
                content_blocks = resp.content.len(),
                input_tokens = resp.usage.input_tokens,
                output_tokens = resp.usage.output_tokens,
                "provider response"
            );
            state.update_usage(resp.usage);

            // Repair tool_use ids: some backends return empty ids or
            // reuse ids across calls, which breaks pairing once the
            // window drops one occurrence but keeps another.
            for block in &mut resp.content {
                if let ContentBlock::ToolUse { id, name, .. } = block {
                    if id.is_empty() || seen_tool_use_ids.contains(id.as_str()) {
                        let new_id = generate_tool_use_id();
                        if id.is_empty() {
                            info!(tool = %name, new_id = %new_id, "minted id for tool_use with empty id");
                        } else {
                            info!(tool = %name, old_id = %id, new_id = %new_id, "replaced duplicate tool_use id");
                        }
                        *id = new_id;
                    }
                    seen_tool_use_ids.insert(id.clone());
                }
            }

            state.last_response = Some(resp.clone());
            let assistant_msg = resp.to_message();
            state.add_message(assistant_msg.clone());
            if let Some(cb) = &req.callbacks.on_message {
                cb(&assistant_msg);
            }

            if resp.stop_reason == StopReason::EndTurn && !resp.has_tool_use() {
                let (steering, follow_up) = fetch_loop_inputs(&state, &req);
                if !steering.is_empty() || !follow_up.is_empty() {
                    apply_loop_inputs(&mut state, &req, steering, follow_up);
                    continue;
                }
                info!(iterations = state.iterations, "agent completed (end_turn)");
                return Ok(state.to_result());
            }

            if resp.stop_reason == StopReason::MaxTokens {
                error!(iteration = state.iterations, "max tokens reached");
                return Err(LoopFailure {
                    error: LoopError::MaxTokensReached,
                    partial: state.to_result(),
                });
            }

            if resp.stop_reason == StopReason::ToolUse || resp.has_tool_use() {
                let tool_uses = resp.tool_uses();
                info!(count = tool_uses.len(), "executing tools");

                let outcome = match self
                    .execute_tools(&tool_uses, &run_tools, &mut tool_ctx, &mut state, &req)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(error) => {
                        return Err(LoopFailure {
                            error,
                            partial: state.to_result(),
                        })
                    }
                };

                let result_msg = build_tool_result_message(&outcome.results);
                state.add_message(result_msg);
                if outcome.interrupted {
                    apply_loop_inputs(&mut state, &req, outcome.steering, outcome.follow_up);
                }
            } else {
                warn!(stop_reason = %resp.stop_reason, "unexpected stop reason without tool_use");
            }
        }
    }

    async fn call_provider(
        &self,
        request: ProviderRequest,
        req: &OrchestratorRequest,
    ) -> Result<ProviderResponse, LoopError> {
        let on_delta = req.callbacks.on_stream_delta.clone();
        let sink = move |delta: ContentBlockDelta| {
            if let Some(cb) = &on_delta {
                cb(&delta);
            }
        };

        let call = async {
            if req.enable_streaming {
                self.provider.stream(request, &sink).await
            } else {
                self.provider.call(request).await
            }
        };

        tokio::select! {
            _ = req.cancellation.cancelled() => Err(LoopError::Cancelled),
            result = call => result.map_err(LoopError::Provider),
        }
    }

    /// Execute tool-use blocks in order, enforcing the active-skill
    /// allowlist and polling loop inputs after every execution. A
    /// non-empty poll interrupts the batch.
    async fn execute_tools(
        &self,
        uses: &[ContentBlock],
        run_tools: &BTreeMap<String, Arc<dyn Tool>>,
        tool_ctx: &mut ToolContext,
        state: &mut LoopState,
        req: &OrchestratorRequest,
    ) -> Result<ToolExecOutcome, LoopError> {
        let mut results: Vec<ToolExecResult> = Vec::with_capacity(uses.len());

        for use_block in uses {
            let ContentBlock::ToolUse { id, name, input } = use_block else {
                continue;
            };
            debug!(tool = %name, id = %id, "calling tool");

            if let Err(err) = ensure_tool_allowed_by_active_skill(tool_ctx, name) {
                warn!(tool = %name, error = %err, "tool blocked by skill allowlist");
                let result = ToolResult::error(&err);
                state.add_tool_call(name, input, &result);
                if let Some(cb) = &req.callbacks.on_tool_result {
                    cb(name, &result);
                }
                results.push(ToolExecResult {
                    id: id.clone(),
                    result,
                });

                let (steering, follow_up) = fetch_loop_inputs(state, req);
                if !steering.is_empty() || !follow_up.is_empty() {
                    return Ok(ToolExecOutcome {
                        results,
                        steering,
                        follow_up,
                        interrupted: true,
                    });
                }
                continue;
            }

            if let Some(cb) = &req.callbacks.on_tool_call {
                cb(name, input);
            }

            let result = match run_tools.get(name.as_str()) {
                None => {
                    error!(tool = %name, "tool not found");
                    ToolResult::error(ToolError::NotFound(name.clone()))
                }
                Some(tool) => {
                    let exec = tool.execute(tool_ctx, input);
                    tokio::select! {
                        _ = req.cancellation.cancelled() => return Err(LoopError::Cancelled),
                        outcome = exec => match outcome {
                            Ok(result) => result,
                            Err(err) => {
                                error!(tool = %name, error = %err, "tool execution error");
                                ToolResult::error(err)
                            }
                        },
                    }
                }
            };

            debug!(
                tool = %name,
                is_error = result.is_error,
                content_len = result.content.len(),
                "tool result"
            );
            if let Some(cb) = &req.callbacks.on_tool_result {
                cb(name, &result);
            }
            state.add_tool_call(name, input, &result);
            results.push(ToolExecResult {
                id: id.clone(),
                result,
            });

            let (steering, follow_up) = fetch_loop_inputs(state, req);
            if !steering.is_empty() || !follow_up.is_empty() {
                return Ok(ToolExecOutcome {
                    results,
                    steering,
                    follow_up,
                    interrupted: true,
                });
            }
        }

        Ok(ToolExecOutcome {
            results,
            steering: Vec::new(),
            follow_up: Vec::new(),
            interrupted: false,
        })
    }
}

struct ToolExecResult {
    id: String,
    result: ToolResult,
}

struct ToolExecOutcome {
    results: Vec<ToolExecResult>,
    steering: Vec<Message>,
    follow_up: Vec<Message>,
    interrupted: bool,
}

/// Mint a unique tool_use id. Minted ids are prefixed so repaired
/// blocks are recognizable in transcripts.
fn generate_tool_use_id() -> String {
    format!("tool_{}", Uuid::new_v4().simple())
}

fn fetch_loop_inputs(
    state: &LoopState,
    req: &OrchestratorRequest,
) -> (Vec<Message>, Vec<Message>) {
    let snapshot = LoopInputSnapshot {
        iteration: state.iterations,
        message_count: state.messages.len(),
        tool_call_count: state.tool_calls.len(),
        last_stop_reason: state.last_response.as_ref().map(|r| r.stop_reason),
    };

    let steering = req
        .get_steering_messages
        .as_ref()
        .map(|fetch| normalize_loop_input_messages(fetch(&snapshot)))
        .unwrap_or_default();
    let follow_up = req
        .get_follow_up_messages
        .as_ref()
        .map(|fetch| normalize_loop_input_messages(fetch(&snapshot)))
        .unwrap_or_default();

    (steering, follow_up)
}

/// Messages with no content are dropped.
fn normalize_loop_input_messages(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|m| !m.content.is_empty())
        .collect()
}

fn apply_loop_inputs(
    state: &mut LoopState,
    req: &OrchestratorRequest,
    steering: Vec<Message>,
    follow_up: Vec<Message>,
) {
    if !steering.is_empty() {
        for message in &steering {
            state.add_message(message.clone());
        }
        if let Some(cb) = &req.callbacks.on_steering_applied {
            cb(&steering);
        }
        info!(count = steering.len(), "applied steering messages");
    }

    if !follow_up.is_empty() {
        for message in &follow_up {
            state.add_message(message.clone());
        }
        if let Some(cb) = &req.callbacks.on_follow_up_applied {
            cb(&follow_up);
        }
        info!(count = follow_up.len(), "applied follow-up messages");
    }
}

/// One user-role message carrying every tool result of the batch, in
/// execution order.
fn build_tool_result_message(results: &[ToolExecResult]) -> Message {
    let content = results
        .iter()
        .map(|r| {
            if r.id.is_empty() {
                warn!("tool result has empty tool_use id");
            }
            ContentBlock::tool_result(&r.id, &r.result.content, r.result.is_error)
        })
        .collect();
    Message {
        role: Role::User,
        content,
    }
}

/// Allowlist enforcement for the active skill. `use_skill` stays
/// callable so the user can switch skills.
fn ensure_tool_allowed_by_active_skill(
    tool_ctx: &ToolContext,
    tool_name: &str,
) -> Result<(), ToolError> {
    if tool_name == skills::EXEMPT_TOOL {
        return Ok(());
    }

    let Some(raw) = tool_ctx.active_skill_allowed_tools() else {
        return Ok(());
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(());
    }

    let allowed = skills::parse_allowed_tools_env(raw);
    if skills::is_tool_allowed(tool_name, &allowed) {
        return Ok(());
    }

    let skill = tool_ctx
        .active_skill_name()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("active skill")
        .to_string();
    Err(ToolError::BlockedBySkill {
        tool_name: tool_name.to_string(),
        skill,
        patterns: allowed.join(", "),
    })
}

/// Combine the base system prompt with SOUL and repository instructions.
pub(crate) fn build_system_prompt(base: &str, soul_content: &str, repo_instructions: &str) -> String {
    let mut parts: Vec<String> = Vec::new();

    let base = base.trim();
    if !base.is_empty() {
        parts.push(base.to_string());
    }

    let soul_content = soul_content.trim();
    if !soul_content.is_empty() {
        parts.push(format!(
            "## Soul\n\nThe following defines your character, personality, and behavioral directives.\nFollow these directives throughout the conversation.\n\n{soul_content}"
        ));
    }

    let repo_instructions = repo_instructions.trim();
    if !repo_instructions.is_empty() {
        parts.push(format!(
            "## Repository Instructions\n\nThe sections below are ordered from repository root to current directory.\nMore specific instructions should override broader ones.\n\n{repo_instructions}"
        ));
    }

    parts.join("\n\n")
}

/// Load layered repo instructions and append the skills prompt block.
fn read_repo_instructions(work_dir: &Path, instruction_files: &[String]) -> String {
    let opts = instructions::LoadOptions {
        candidate_files: instruction_files.to_vec(),
        max_bytes: 0,
    };
    let result = instructions::load(work_dir, &opts);

    let mut combined = result.content.trim().to_string();
    if combined.is_empty() {
        info!(work_dir = %work_dir.display(), "no repository instructions found");
    } else {
        info!(
            sources = ?result.sources,
            bytes = combined.len(),
            truncated = result.truncated,
            "loaded repo instructions"
        );
    }

    let block = build_skill_metadata(work_dir);
    if block.content.trim().is_empty() {
        debug!(work_dir = %work_dir.display(), "no discoverable skills");
    } else {
        info!(
            count = block.skill_count,
            truncated = block.truncated,
            "loaded skill metadata"
        );
        if combined.is_empty() {
            combined = block.content;
        } else {
            combined.push_str("\n\n");
            combined.push_str(&block.content);
        }
    }

    combined
}

fn build_skill_metadata(work_dir: &Path) -> skills::PromptBlock {
    let search_dirs = skills::default_search_dirs(work_dir);
    let discovered = skills::discover(&search_dirs);
    if discovered.is_empty() {
        return skills::PromptBlock::default();
    }
    skills::build_prompt_block(&discovered, skills::DEFAULT_PROMPT_BLOCK_MAX_BYTES)
}

fn read_soul_content(work_dir: &Path, soul_file: Option<std::path::PathBuf>) -> String {
    let opts = soul::SoulOptions {
        file: soul_file,
        max_bytes: 0,
    };
    let result = soul::load(work_dir, &opts);
    if !result.content.is_empty() {
        info!(
            source = %result.source.display(),
            bytes = result.content.len(),
            truncated = result.truncated,
            "loaded SOUL"
        );
    }
    result.content
}

/// Rewrite the initial user message when it is a `/skill` invocation,
/// and activate the skill in the tool context.
fn apply_slash_skill_invocation(
    state: &mut LoopState,
    tool_ctx: &mut ToolContext,
    work_dir: &Path,
) -> Result<bool, SkillError> {
    let Some(initial) = state.messages.first() else {
        return Ok(false);
    };
    if initial.role != Role::User {
        return Ok(false);
    }
    let Some((name, arguments)) = skills::parse_slash_command(&initial.get_text()) else {
        return Ok(false);
    };

    let discovered = skills::discover(&skills::default_search_dirs(work_dir));
    if discovered.is_empty() {
        return Ok(false);
    }
    // An unknown slash command is not an error; the message stays as-is.
    let Ok(selected) = skills::resolve_for_invocation(&discovered, &name) else {
        return Ok(false);
    };
    if !selected.user_invocable {
        return Err(SkillError::NotUserInvocable {
            name: selected.name,
        });
    }

    info!(
        skill = %selected.name,
        scope = %selected.scope,
        path = %selected.path.display(),
        args = %arguments.trim(),
        "slash-skill invocation resolved"
    );

    let session_id = tool_ctx.session_id().unwrap_or("").trim().to_string();
    let rendered = skills::render_for_invocation(
        &selected,
        &arguments,
        &session_id,
        skills::DEFAULT_SKILL_READ_MAX_BYTES,
    )?;

    let mut replacement = format!("User invoked /{name}\n");
    if !arguments.trim().is_empty() {
        replacement.push_str(&format!("Arguments: {}\n", arguments.trim()));
    }
    replacement.push('\n');
    replacement.push_str(&rendered.rendered);
    if rendered.truncated {
        replacement.push_str(&format!(
            "\n\n[truncated to {} bytes]",
            skills::DEFAULT_SKILL_READ_MAX_BYTES
        ));
    }
    state.messages[0] = Message::text(Role::User, replacement.trim());

    tool_ctx.set_active_skill(
        &selected.name,
        &selected.path.to_string_lossy(),
        &selected.allowed_tools,
    );

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_use_ids_are_unique_and_prefixed() {
        let a = generate_tool_use_id();
        let b = generate_tool_use_id();
        assert_ne!(a, b);
        assert!(a.starts_with("tool_"));
        assert_eq!(a.len(), "tool_".len() + 32);
    }

    #[test]
    fn system_prompt_sections_in_order() {
        let prompt = build_system_prompt("base", "be kind", "## AGENT.md\nrules");
        let base = prompt.find("base").unwrap();
        let soul = prompt.find("## Soul").unwrap();
        let repo = prompt.find("## Repository Instructions").unwrap();
        assert!(base < soul && soul < repo);
        assert!(prompt.contains("be kind"));
        assert!(prompt.contains("rules"));
    }

    #[test]
    fn system_prompt_skips_empty_sections() {
        assert_eq!(build_system_prompt("only base", "", "  "), "only base");
        assert_eq!(build_system_prompt("", "", ""), "");
    }

    #[test]
    fn allowlist_blocks_and_exempts() {
        let mut ctx = ToolContext::new("/tmp");
        ctx.set_active_skill("deploy", "/p/SKILL.md", &["Bash".into(), "Read".into()]);

        assert!(ensure_tool_allowed_by_active_skill(&ctx, "bash").is_ok());
        assert!(ensure_tool_allowed_by_active_skill(&ctx, "read_file").is_ok());
        assert!(ensure_tool_allowed_by_active_skill(&ctx, "use_skill").is_ok());

        let err = ensure_tool_allowed_by_active_skill(&ctx, "write_file").unwrap_err();
        assert!(matches!(err, ToolError::BlockedBySkill { .. }));
        assert!(err.to_string().contains("deploy"));
    }

    #[test]
    fn allowlist_without_active_skill_is_open() {
        let ctx = ToolContext::new("/tmp");
        assert!(ensure_tool_allowed_by_active_skill(&ctx, "anything").is_ok());
    }

    #[test]
    fn normalize_drops_empty_messages() {
        let messages = vec![
            Message::text(Role::User, "keep"),
            Message {
                role: Role::User,
                content: Vec::new(),
            },
        ];
        let normalized = normalize_loop_input_messages(messages);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].get_text(), "keep");
    }

    #[test]
    fn tool_result_message_preserves_order() {
        let results = vec![
            ToolExecResult {
                id: "a".into(),
                result: ToolResult::ok("one"),
            },
            ToolExecResult {
                id: "b".into(),
                result: ToolResult::error("two"),
            },
        ];
        let msg = build_tool_result_message(&results);
        assert_eq!(msg.role, Role::User);
        match (&msg.content[0], &msg.content[1]) {
            (
                ContentBlock::ToolResult {
                    tool_use_id: first,
                    is_error: e1,
                    ..
                },
                ContentBlock::ToolResult {
                    tool_use_id: second,
                    is_error: e2,
                    ..
                },
            ) => {
                assert_eq!(first, "a");
                assert_eq!(second, "b");
                assert!(!e1);
                assert!(e2);
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }
}
