//! Three-tier permission gate for tool calls.
//!
//! `classify` is a pure function of the tool name and its input. Unknown
//! tools fall back to [`PermissionDecision::Ask`].

use keel_core::message::ToolCall;
use keel_core::tool::names;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::debug;

use crate::shell::{is_destructive, is_read_only, split_shell_commands};

/// Outcome of classifying a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PermissionDecision {
    AlwaysAllow,
    Ask,
    Deny,
}

impl PermissionDecision {
    /// Resolve without a human where possible.
    ///
    /// `Deny` is final even in trust mode. Returns `None` when the user
    /// must be asked.
    pub fn resolve(self, trust_mode: bool) -> Option<bool> {
        match self {
            PermissionDecision::Deny => Some(false),
            PermissionDecision::AlwaysAllow => Some(true),
            PermissionDecision::Ask if trust_mode => Some(true),
            PermissionDecision::Ask => None,
        }
    }
}

/// Classify a tool call into always-allow, ask or deny.
pub fn classify(tool_name: &str, input: &serde_json::Value) -> PermissionDecision {
    match tool_name {
        names::READ_FILE
        | names::GLOB
        | names::GREP
        | names::LIST_DIR
        | names::WEB_SEARCH
        | names::WEB_FETCH
        | names::ASK_USER
        | names::SAVE_KNOWLEDGE
        | names::ENTER_PLAN_MODE
        | names::EXIT_PLAN_MODE => PermissionDecision::AlwaysAllow,
        names::WRITE_FILE | names::EDIT => PermissionDecision::Ask,
        names::SHELL => {
            let command = input.get("command").and_then(|v| v.as_str()).unwrap_or("");
            classify_shell(command)
        }
        _ => PermissionDecision::Ask,
    }
}

fn classify_shell(command: &str) -> PermissionDecision {
    let parts = split_shell_commands(command);
    if parts.iter().any(|p| is_destructive(p)) {
        return PermissionDecision::Deny;
    }
    if !parts.is_empty() && parts.iter().all(|p| is_read_only(p)) {
        return PermissionDecision::AlwaysAllow;
    }
    PermissionDecision::Ask
}

/// Decide whether a call may run.
///
/// `ask` is invoked at most once, and only when the call classifies as
/// `Ask` outside trust mode.
pub async fn check_permission<F, Fut>(call: &ToolCall, trust_mode: bool, ask: F) -> bool
where
    F: FnOnce(&ToolCall) -> Fut,
    Fut: Future<Output = bool>,
{
    let decision = classify(&call.name, &call.input);
    debug!(tool = %call.name, ?decision, trust_mode, "Permission classified");
    match decision.resolve(trust_mode) {
        Some(allowed) => allowed,
        None => ask(call).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn shell(cmd: &str) -> PermissionDecision {
        classify(names::SHELL, &json!({ "command": cmd }))
    }

    #[test]
    fn compound_shell_commands() {
        assert_eq!(shell("ls && rm -rf /"), PermissionDecision::Deny);
        assert_eq!(shell("ls && npm install"), PermissionDecision::Ask);
        assert_eq!(shell("ls -la | wc -l"), PermissionDecision::AlwaysAllow);
        assert_eq!(shell("git status"), PermissionDecision::AlwaysAllow);
    }

    #[test]
    fn hidden_commands_are_not_read_only() {
        assert_eq!(shell("ls\nnpm install evil"), PermissionDecision::Ask);
        assert_eq!(shell("ls & touch /tmp/pwned"), PermissionDecision::Ask);
        assert_eq!(shell("echo $(touch /tmp/pwned)"), PermissionDecision::Ask);
        assert_eq!(shell("cat `which touch`"), PermissionDecision::Ask);
        assert_eq!(shell("diff <(ls a) <(ls b)"), PermissionDecision::Ask);
        assert_eq!(shell("ls\nrm -rf build"), PermissionDecision::Deny);
    }

    #[test]
    fn destructive_overrides_read_only() {
        assert_eq!(shell("echo hi; sudo reboot"), PermissionDecision::Deny);
    }

    #[test]
    fn empty_shell_command_asks() {
        assert_eq!(classify(names::SHELL, &json!({})), PermissionDecision::Ask);
    }

    #[test]
    fn static_rules() {
        assert_eq!(classify(names::READ_FILE, &json!({})), PermissionDecision::AlwaysAllow);
        assert_eq!(classify(names::SAVE_KNOWLEDGE, &json!({})), PermissionDecision::AlwaysAllow);
        assert_eq!(classify(names::ENTER_PLAN_MODE, &json!({})), PermissionDecision::AlwaysAllow);
        assert_eq!(classify(names::WRITE_FILE, &json!({})), PermissionDecision::Ask);
        assert_eq!(classify(names::EDIT, &json!({})), PermissionDecision::Ask);
        assert_eq!(classify("mystery_tool", &json!({})), PermissionDecision::Ask);
    }

    #[test]
    fn classify_is_deterministic() {
        let input = json!({ "command": "ls && npm install" });
        let first = classify(names::SHELL, &input);
        for _ in 0..10 {
            assert_eq!(classify(names::SHELL, &input), first);
        }
    }

    async fn run_check(call: &ToolCall, trust: bool, answer: bool) -> (bool, usize) {
        let asked = AtomicUsize::new(0);
        let allowed = check_permission(call, trust, |_| {
            asked.fetch_add(1, Ordering::SeqCst);
            async move { answer }
        })
        .await;
        (allowed, asked.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn deny_never_asks() {
        let call = ToolCall::new("1", names::SHELL, json!({ "command": "rm -rf /" }));
        assert_eq!(run_check(&call, false, true).await, (false, 0));
        assert_eq!(run_check(&call, true, true).await, (false, 0));
    }

    #[tokio::test]
    async fn always_allow_and_trust_never_ask() {
        let read = ToolCall::new("1", names::SHELL, json!({ "command": "git status" }));
        assert_eq!(run_check(&read, false, false).await, (true, 0));

        let write = ToolCall::new("2", names::WRITE_FILE, json!({ "file_path": "a", "content": "" }));
        assert_eq!(run_check(&write, true, false).await, (true, 0));
    }

    #[tokio::test]
    async fn ask_invokes_callback_exactly_once() {
        let call = ToolCall::new("1", names::EDIT, json!({}));
        assert_eq!(run_check(&call, false, true).await, (true, 1));
        assert_eq!(run_check(&call, false, false).await, (false, 1));
    }
}
