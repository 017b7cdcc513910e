//! # Sleuth Core
//!
//! Domain types, traits, and error definitions for the Sleuth analyst agent.
//! This crate has **no framework dependencies**: it defines the model that
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Collaborators (LLM providers, tools) are traits defined here and
//! implemented elsewhere. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus, SessionOutcome};
pub use message::{HistoryEntry, HistoryRole, Message, Role, ToolCallRequest};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition};
pub use state::{ConversationState, EvidenceChunk, StateDelta};
pub use tool::{Tool, ToolRegistry, ToolResult};
