//! Conversation state owned by the agent loop for one session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use uuid::Uuid;

use crate::message::Message;

/// Cumulative token usage and estimated cost for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub estimated_cost: f64,
    pub currency: String,
}

impl Default for TokenUsage {
    fn default() -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            estimated_cost: 0.0,
            currency: "USD".into(),
        }
    }
}

/// Everything the agent loop accumulates over a session.
///
/// Mutated only by the loop, between turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Ordered conversation
    pub messages: Vec<Message>,

    /// Cumulative usage across all turns
    pub usage: TokenUsage,

    /// Whether plan mode is active
    pub plan_mode: bool,

    /// Identifier of the active plan, if any
    pub plan_id: Option<String>,

    pub session_id: String,
    pub started_at: DateTime<Utc>,

    /// Absolute paths written or edited this session
    pub files_modified: BTreeSet<PathBuf>,

    /// Turns taken across every run of this session
    pub turn_count: u32,
}

impl ConversationState {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            messages: Vec::new(),
            usage: TokenUsage::default(),
            plan_mode: false,
            plan_id: None,
            session_id: session_id_for(started_at),
            started_at,
            files_modified: BTreeSet::new(),
            turn_count: 0,
        }
    }

    /// Text of the last assistant message, if it has any.
    pub fn last_answer(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::Assistant && !m.content.is_empty())
            .map(|m| m.content.as_str())
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

/// `YYYYMMDD-HHMMSS-xxxxxxxx`
fn session_id_for(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", at.format("%Y%m%d-%H%M%S"), &suffix[..8])
}
