//! Facade behavior: `execute`, `execute_stream`, and capabilities.

mod common;

use std::sync::Arc;

use common::*;

use gearloop_agent::{
    Agent, AgentOptions, AgentRequest, AgentStreamEvent, ApiAgent, ApiAgentOptions, LoopError,
    LoopInputSnapshot,
};
use gearloop_core::{Message, Registry, Role};

fn agent_with(provider: Arc<dyn gearloop_core::Provider>, options: ApiAgentOptions) -> ApiAgent {
    ApiAgent::new(provider, Arc::new(Registry::new()), options)
}

fn task_request(task: &str) -> AgentRequest {
    AgentRequest {
        task: task.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn execute_returns_final_text_and_usage() {
    let provider = Arc::new(ScriptedProvider::new(vec![end_turn("done")]));
    let agent = agent_with(provider, ApiAgentOptions::default());

    let result = agent.execute(task_request("simple task")).await.unwrap();
    assert!(result.success);
    assert_eq!(result.message, "done");
    assert_eq!(result.summary, "done");
    assert_eq!(result.usage.total_iterations, 1);
    assert_eq!(result.usage.total_input_tokens, 10);
    assert!(!result.raw_output.is_empty());
}

#[tokio::test]
async fn execute_failure_carries_structured_result() {
    let agent = agent_with(Arc::new(ErrorProvider), ApiAgentOptions::default());

    let err = agent.execute(task_request("will fail")).await.unwrap_err();
    assert!(matches!(err.error, LoopError::Provider(_)));
    assert!(!err.result.success);
    assert!(err.result.message.contains("orchestrator error"));
}

#[tokio::test]
async fn execute_stream_disabled_reports_config_error() {
    let provider = Arc::new(ScriptedProvider::new(vec![end_turn("done")]));
    let agent = agent_with(
        provider,
        ApiAgentOptions {
            enable_streaming: false,
            ..Default::default()
        },
    );

    let (events, errors) = agent.execute_stream(task_request("stream please"));
    let (events, errors) = collect_stream(events, errors).await;

    assert!(events.is_empty(), "expected no events, got {events:?}");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], LoopError::StreamingDisabled));
}

#[tokio::test]
async fn request_level_streaming_override_emits_deltas() {
    let provider = Arc::new(StreamingProvider {
        text: "streamed".into(),
    });
    let agent = agent_with(
        provider,
        ApiAgentOptions {
            enable_streaming: false,
            ..Default::default()
        },
    );

    let mut req = task_request("stream please");
    req.options.enable_streaming = true;

    let (events, errors) = agent.execute_stream(req);
    let (events, errors) = collect_stream(events, errors).await;

    assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    let start = event_index(&events, "agent_start").unwrap();
    let delta = event_index(&events, "message_delta").unwrap();
    let message_end = event_index(&events, "message_end").unwrap();
    let agent_end = event_index(&events, "agent_end").unwrap();
    assert!(start < delta && delta < message_end && message_end < agent_end);

    // Delta concatenation reconstructs the message_end text.
    let mut reconstructed = String::new();
    for event in &events {
        if let AgentStreamEvent::MessageDelta { delta } = event {
            reconstructed.push_str(delta);
        }
    }
    match &events[message_end] {
        AgentStreamEvent::MessageEnd { message } => assert_eq!(&reconstructed, message),
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn call_only_provider_falls_back_to_coarse_events() {
    let provider = Arc::new(ScriptedProvider::new(vec![end_turn("fallback")]));
    let agent = agent_with(
        provider,
        ApiAgentOptions {
            enable_streaming: true,
            ..Default::default()
        },
    );

    let (events, errors) = agent.execute_stream(task_request("fallback stream"));
    let (events, errors) = collect_stream(events, errors).await;

    assert!(errors.is_empty());
    assert_eq!(events.len(), 3, "expected coarse events, got {events:?}");
    assert!(matches!(events[0], AgentStreamEvent::AgentStart));
    match &events[1] {
        AgentStreamEvent::MessageEnd { message } => assert_eq!(message, "fallback"),
        other => panic!("expected message_end, got {other:?}"),
    }
    match &events[2] {
        AgentStreamEvent::AgentEnd { message, usage } => {
            assert_eq!(message, "fallback");
            assert_eq!(usage.total_iterations, 1);
        }
        other => panic!("expected agent_end, got {other:?}"),
    }
}

#[tokio::test]
async fn steering_and_follow_up_events_arrive_in_order() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        end_turn("first"),
        end_turn("second"),
    ]));
    let agent = agent_with(
        provider,
        ApiAgentOptions {
            enable_streaming: true,
            ..Default::default()
        },
    );

    let mut req = task_request("inject runtime guidance");
    req.options.get_steering_messages = Some(Arc::new(|s: &LoopInputSnapshot| {
        if s.iteration == 1 {
            vec![Message::text(Role::User, "steer now")]
        } else {
            Vec::new()
        }
    }));
    req.options.get_follow_up_messages = Some(Arc::new(|s: &LoopInputSnapshot| {
        if s.iteration == 1 {
            vec![Message::text(Role::User, "follow up now")]
        } else {
            Vec::new()
        }
    }));

    let (events, errors) = agent.execute_stream(req);
    let (events, errors) = collect_stream(events, errors).await;

    assert!(errors.is_empty());
    let steering = event_index(&events, "steering_applied").unwrap();
    let follow_up = event_index(&events, "followup_applied").unwrap();
    let agent_end = event_index(&events, "agent_end").unwrap();
    assert!(steering < follow_up);
    assert!(follow_up < agent_end);
}

#[tokio::test]
async fn tool_events_are_emitted_between_message_boundaries() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_use_response(&[("tu_1", "noop")]),
        end_turn("done"),
    ]));
    let mut registry = Registry::new();
    registry.must_register(Arc::new(CountingTool::new("noop", "ok")));
    let agent = ApiAgent::new(
        provider,
        Arc::new(registry),
        ApiAgentOptions {
            enable_streaming: true,
            ..Default::default()
        },
    );

    let (events, errors) = agent.execute_stream(task_request("use the tool"));
    let (events, errors) = collect_stream(events, errors).await;

    assert!(errors.is_empty());
    let tool_call = event_index(&events, "tool_call").unwrap();
    let tool_result = event_index(&events, "tool_result").unwrap();
    let agent_end = event_index(&events, "agent_end").unwrap();
    assert!(tool_call < tool_result && tool_result < agent_end);
    match &events[tool_result] {
        AgentStreamEvent::ToolResult {
            tool_name,
            is_error,
        } => {
            assert_eq!(tool_name, "noop");
            assert!(!is_error);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn execution_failure_sends_error_without_agent_end() {
    let agent = agent_with(
        Arc::new(ErrorProvider),
        ApiAgentOptions {
            enable_streaming: true,
            ..Default::default()
        },
    );

    let (events, errors) = agent.execute_stream(task_request("failing stream"));
    let (events, errors) = collect_stream(events, errors).await;

    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0], LoopError::Provider(_)));
    assert!(event_index(&events, "agent_end").is_none());
}

#[tokio::test]
async fn per_request_iteration_cap_overrides_agent_default() {
    let mut responses = Vec::new();
    for i in 0..10 {
        let id = format!("tu_{i}");
        responses.push(tool_use_response(&[(id.as_str(), "noop")]));
    }
    let provider = Arc::new(ScriptedProvider::new(responses));
    let mut registry = Registry::new();
    registry.must_register(Arc::new(CountingTool::new("noop", "ok")));
    let agent = ApiAgent::new(provider.clone(), Arc::new(registry), ApiAgentOptions::default());

    let mut req = task_request("bounded");
    req.options = AgentOptions {
        max_iterations: 2,
        ..Default::default()
    };

    let err = agent.execute(req).await.unwrap_err();
    assert!(matches!(err.error, LoopError::IterationLimit(2)));
    assert_eq!(provider.call_count(), 2);
}

#[tokio::test]
async fn denied_tools_are_removed_from_the_run() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_use_response(&[("tu_1", "noop")]),
        end_turn("done"),
    ]));
    let noop = Arc::new(CountingTool::new("noop", "ok"));
    let mut registry = Registry::new();
    registry.must_register(noop.clone());
    let agent = ApiAgent::new(provider.clone(), Arc::new(registry), ApiAgentOptions::default());

    let mut req = task_request("denied");
    req.options.denied_tools = vec!["noop".into()];

    let result = agent.execute(req).await.unwrap();
    assert_eq!(noop.execution_count(), 0);
    assert!(result.tool_calls[0].result.is_error);

    // The provider was not offered the denied tool either.
    assert!(provider.request_at(0).tools.is_empty());
}

#[tokio::test]
async fn capabilities_reflect_registry_and_provider() {
    let provider = Arc::new(StreamingProvider {
        text: "hi".into(),
    });
    let mut registry = Registry::new();
    registry.must_register(Arc::new(CountingTool::new("noop", "ok")));
    let agent = ApiAgent::new(
        provider,
        Arc::new(registry),
        ApiAgentOptions {
            enable_streaming: true,
            ..Default::default()
        },
    );

    let caps = agent.capabilities();
    assert!(caps.supports_tools);
    assert_eq!(caps.available_tools.len(), 1);
    assert_eq!(caps.available_tools[0].name, "noop");
    assert!(caps.supports_streaming);
    assert!(caps.supports_compaction);
    assert_eq!(caps.provider, "streaming");
    assert_eq!(caps.max_context_tokens, 200_000);

    assert!(agent.close().is_ok());
}
