//! ModelClient trait: the abstraction over language model backends.
//!
//! A model client sends the conversation plus the tool catalog to a model
//! and streams back text deltas, tool calls, and the results of tools it
//! executed itself (`ToolKind::AutoExecuted`). The stream always ends with
//! a [`StreamEvent::Finish`] carrying the messages produced this turn.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::{Message, Role, ToolCall};
use crate::tool::ToolCatalog;

/// Receiver side of a model stream.
pub type ModelStream = mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>;

/// Everything a model client needs for one turn.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Full model identifier, e.g. `anthropic:claude-sonnet-4-5`
    pub model: String,

    /// System instructions for this turn
    pub system_prompt: String,

    /// The full conversation so far
    pub messages: Vec<Message>,

    /// Tools the model may call
    pub tools: Arc<ToolCatalog>,
}

/// Token usage reported for one model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Error,
    Other(String),
}

impl FinishReason {
    /// Map a provider's raw finish reason.
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "stop" | "end_turn" | "stop_sequence" => FinishReason::Stop,
            "tool_calls" | "tool-calls" | "tool_use" | "function_call" => FinishReason::ToolCalls,
            "length" | "max_tokens" => FinishReason::Length,
            "content_filter" | "content-filter" => FinishReason::ContentFilter,
            "error" => FinishReason::Error,
            other => FinishReason::Other(other.to_string()),
        }
    }
}

/// The final result of one streamed model call.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Messages produced this turn, in order: the assistant message and
    /// the results of any auto-executed tools.
    pub messages: Vec<Message>,
    pub usage: Usage,
    pub finish_reason: FinishReason,
}

impl TurnOutcome {
    /// Tool calls requested by the assistant this turn, in emission order.
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls.iter().cloned())
            .collect()
    }
}

/// A single event in a model stream.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A fragment of assistant text
    TextDelta(String),
    /// The model requested a tool
    ToolCall(ToolCall),
    /// Full output of an auto-executed tool
    ToolResult { call_id: String, text: String },
    /// End of the turn
    Finish(TurnOutcome),
}

/// The core ModelClient trait.
///
/// The agent loop calls `stream()` once per turn and `summarize()` for
/// compression and session summaries, without knowing which backend is used.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g., "openai-compat").
    fn name(&self) -> &str;

    /// Start a streamed turn. Cancelling `cancel` stops the stream and any
    /// auto-executed tool still running.
    async fn stream(
        &self,
        request: ModelRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<ModelStream, ProviderError>;

    /// Non-streaming completion used for summaries.
    async fn summarize(
        &self,
        model: &str,
        messages: &[Message],
        instruction: &str,
    ) -> std::result::Result<String, ProviderError>;
}
