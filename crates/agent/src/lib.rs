//! The agent loop for keel.
//!
//! One [`AgentLoop`] per session drives the conversation:
//!
//! 1. **Append** the user message
//! 2. **Budget check**: over the provider's token budget, checkpoint the
//!    session and compress older history
//! 3. **Build the system prompt**: base instructions, plan mode overlay,
//!    knowledge context
//! 4. **Stream** a model turn, forwarding text and tool activity
//! 5. **Dispatch** requested tools one at a time: control tools switch plan
//!    mode, `ask_user` and `ask`-classified calls pause for a human,
//!    gated tools run after the permission gate
//! 6. Loop until the model stops calling tools or the turn limit is hit
//!
//! The loop is a state machine ([`AgentRun`]) that yields a pending
//! [`Interaction`] instead of waiting inside a callback.

pub mod context;
pub mod loop_runner;
pub mod observer;
pub mod plan_mode;
pub mod prompt;
pub mod recovery;

#[cfg(test)]
mod test_support;

pub use context::{KEEP_RECENT, compress_messages, context_window, estimate_tokens, token_budget};
pub use loop_runner::{
    AgentLoop, AgentRun, Interaction, InteractionAnswer, LoopOptions, ResumeError, RunStatus,
};
pub use observer::{AgentObserver, InteractionResponder, LoopError, NoopObserver};
pub use plan_mode::{list_plans, read_plan};
pub use prompt::{PromptEnv, build_system_prompt};
pub use recovery::{ClassifiedError, ErrorKind, classify_model_error};
