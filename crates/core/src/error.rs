//! Error types for the GearLoop domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded
//! context has its own error enum; the top-level [`Error`] wraps them.

use thiserror::Error;

/// The top-level error type for GearLoop core operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures of an LLM provider call.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Failed to decode provider response: {0}")]
    Decode(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Failures inside the tool subsystem.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("permission denied: {operation} — {reason}")]
    PermissionDenied { operation: String, reason: String },

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool {tool_name:?} is blocked by skill {skill:?} allowed-tools policy ({patterns})")]
    BlockedBySkill {
        tool_name: String,
        skill: String,
        patterns: String,
    },
}
