//! Core domain types for GearLoop.
//!
//! This crate defines the vocabulary the rest of the workspace speaks:
//! messages and content blocks, the provider abstraction, the tool
//! trait with its registry and execution context, and the shared error
//! types. It deliberately contains no I/O beyond trait definitions —
//! concrete providers and tools live in the embedding application and
//! in `gearloop-tools`.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{ContentBlock, ContentBlockDelta, Message, Role, StopReason, Usage};
pub use provider::{DeltaSink, Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use tool::{
    Permissions, Registry, Tool, ToolContext, ToolResult, ENV_ACTIVE_SKILL_ALLOWED_TOOLS,
    ENV_ACTIVE_SKILL_NAME, ENV_ACTIVE_SKILL_PATH, ENV_SESSION_ID,
};
