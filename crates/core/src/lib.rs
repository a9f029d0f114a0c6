//! # keel core
//!
//! Domain types, traits, and error definitions for the keel coding assistant.
//! Every other crate in the workspace depends inward on this one.
//!
//! ## Layout
//!
//! - [`message`]: conversation messages and tool-call payloads
//! - [`tool`]: the `Tool` trait, the closed [`ToolKind`] set and the [`ToolCatalog`]
//! - [`model`]: the [`ModelClient`] seam and its streamed events
//! - [`knowledge`] / [`session`]: persisted memory and session summary records
//! - [`state`]: the [`ConversationState`] owned by the agent loop

pub mod error;
pub mod knowledge;
pub mod message;
pub mod model;
pub mod session;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result, ToolError};
pub use knowledge::{Category, KnowledgeFact, Scope, normalize_key};
pub use message::{Message, Role, ToolCall};
pub use model::{FinishReason, ModelClient, ModelRequest, ModelStream, StreamEvent, TurnOutcome, Usage};
pub use session::{SessionStatus, SessionSummary};
pub use state::{ConversationState, TokenUsage};
pub use tool::{Tool, ToolCatalog, ToolDefinition, ToolKind, ToolResult};
