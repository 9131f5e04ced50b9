//! HTTP chat gateway for GearLoop.
//!
//! A thin presentation layer over any [`Agent`]:
//!
//! - `POST /api/chat` — one blocking chat turn
//! - `POST /api/chat/stream` — Server-Sent Events mirroring the agent's
//!   typed stream events (404 when streaming is disabled)
//! - `GET /healthz` — liveness check
//!
//! Built on Axum; request tracing comes from `tower-http`.

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};

use gearloop_agent::{Agent, AgentRequest};

/// Chat handler configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// System prompt applied to every chat request.
    #[serde(default)]
    pub system_prompt: String,

    /// Explicit SOUL file path forwarded to the agent.
    #[serde(default)]
    pub soul_file: Option<PathBuf>,

    /// Working directory used when the request does not name one.
    #[serde(default = "default_dir")]
    pub default_dir: PathBuf,

    /// Whether `/api/chat/stream` is served.
    #[serde(default)]
    pub enable_streaming: bool,
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: String::new(),
            soul_file: None,
            default_dir: default_dir(),
            enable_streaming: false,
        }
    }
}

/// Gateway server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub chat: ChatConfig,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8787
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            chat: ChatConfig::default(),
        }
    }
}

/// JSON body for `POST /api/chat` and `POST /api/chat/stream`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub work_dir: Option<PathBuf>,
}

/// JSON response from `POST /api/chat`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub reply: String,

    /// Legacy field from the older decision contract; the core never
    /// populates it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,

    pub usage: UsageInfo,
}

/// Token/iteration stats mirrored onto the wire.
#[derive(Debug, Clone, Serialize)]
pub struct UsageInfo {
    pub iterations: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// JSON error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

struct AppState {
    agent: Arc<dyn Agent>,
    config: ChatConfig,
}

/// Build the gateway router for an agent.
pub fn build_router(agent: Arc<dyn Agent>, config: ChatConfig) -> Router {
    let state = Arc::new(AppState { agent, config });
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/chat/stream", post(handle_chat_stream))
        .route("/healthz", get(handle_health))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the gateway until the process exits.
pub async fn serve(config: GatewayConfig, agent: Arc<dyn Agent>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let router = build_router(agent, config.chat);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "gateway listening");
    axum::serve(listener, router).await
}

fn agent_request(state: &AppState, req: &ChatRequest) -> AgentRequest {
    let work_dir = req
        .work_dir
        .clone()
        .unwrap_or_else(|| state.config.default_dir.clone());
    AgentRequest {
        task: req.message.clone(),
        system_prompt: state.config.system_prompt.clone(),
        soul_file: state.config.soul_file.clone(),
        work_dir,
        ..Default::default()
    }
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if req.message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "message is required".into(),
            }),
        )
            .into_response();
    }

    match state.agent.execute(agent_request(&state, &req)).await {
        Ok(result) => (
            StatusCode::OK,
            Json(ChatResponse {
                reply: result.message,
                decision: None,
                usage: UsageInfo {
                    iterations: result.usage.total_iterations,
                    input_tokens: result.usage.total_input_tokens,
                    output_tokens: result.usage.total_output_tokens,
                },
            }),
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "agent execution failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("agent execution failed: {err}"),
                }),
            )
                .into_response()
        }
    }
}

async fn handle_chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Response {
    if !state.config.enable_streaming {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "streaming is disabled".into(),
            }),
        )
            .into_response();
    }
    if req.message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "message is required".into(),
            }),
        )
            .into_response();
    }

    let mut agent_req = agent_request(&state, &req);
    agent_req.options.enable_streaming = true;

    let (mut events, mut errors) = state.agent.execute_stream(agent_req);
    let (tx, rx) = mpsc::unbounded_channel::<Result<Event, Infallible>>();

    tokio::spawn(async move {
        let mut events_open = true;
        let mut errors_open = true;
        while events_open || errors_open {
            tokio::select! {
                event = events.recv(), if events_open => match event {
                    Some(event) => {
                        match Event::default().event(event.event_type()).json_data(&event) {
                            Ok(sse_event) => {
                                if tx.send(Ok(sse_event)).is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                error!(error = %err, "failed to encode SSE event");
                                return;
                            }
                        }
                    }
                    None => events_open = false,
                },
                failure = errors.recv(), if errors_open => match failure {
                    Some(failure) => {
                        let payload = serde_json::json!({
                            "type": "error",
                            "error": failure.to_string(),
                        });
                        if let Ok(sse_event) = Event::default().event("error").json_data(&payload) {
                            let _ = tx.send(Ok(sse_event));
                        }
                        return;
                    }
                    None => errors_open = false,
                },
            }
        }
    });

    Sse::new(UnboundedReceiverStream::new(rx)).into_response()
}
