//! Callbacks the agent loop reports to, and the responder that answers
//! its interaction points.

use async_trait::async_trait;
use keel_core::message::ToolCall;
use keel_core::state::TokenUsage;
use keel_tools::QuestionOption;
use thiserror::Error;

use crate::recovery::ClassifiedError;

/// Errors reported through [`AgentObserver::on_error`]. None of them
/// abort the session: the state accumulated so far is always returned.
#[derive(Debug, Clone, Error)]
pub enum LoopError {
    #[error("{0}")]
    Model(ClassifiedError),

    #[error("Reached maximum turns ({0}). Stopping agent loop.")]
    TurnLimit(u32),

    #[error("Cancelled.")]
    Cancelled,
}

/// Receives progress from a run. Every method defaults to a no-op.
///
/// Text deltas can arrive at high frequency; batching screen updates is
/// up to the implementor.
pub trait AgentObserver: Send {
    fn on_text_delta(&mut self, _text: &str) {}

    fn on_tool_call(&mut self, _call: &ToolCall) {}

    fn on_tool_result(&mut self, _call_id: &str, _text: &str) {}

    fn on_shell_output(&mut self, _chunk: &str) {}

    fn on_usage_update(&mut self, _usage: &TokenUsage) {}

    fn on_context_compressed(&mut self, _note: &str) {}

    fn on_error(&mut self, _error: &LoopError) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl AgentObserver for NoopObserver {}

/// Answers the loop's interaction points for [`AgentLoop::run`](crate::AgentLoop::run).
#[async_trait]
pub trait InteractionResponder: Send {
    /// Approve or decline a permission-gated call.
    async fn approve(&mut self, call: &ToolCall) -> bool;

    /// Answer an `ask_user` question.
    async fn answer(&mut self, question: &str, options: &[QuestionOption]) -> String;
}
