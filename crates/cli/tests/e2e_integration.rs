//! End-to-end integration tests for the keel agent loop.
//!
//! These tests wire the real tool catalog, permission gate, knowledge
//! stores and session store around a scripted model, and exercise whole
//! conversations: gated writes and shell commands, plan mode, auto memory
//! and continuation across sessions.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keel_agent::{
    AgentLoop, AgentObserver, InteractionResponder, LoopError, LoopOptions, list_plans,
};
use keel_core::error::ProviderError;
use keel_core::message::{Message, Role, ToolCall};
use keel_core::model::{
    FinishReason, ModelClient, ModelRequest, ModelStream, StreamEvent, TurnOutcome, Usage,
};
use keel_core::state::ConversationState;
use keel_core::tool::names;
use keel_memory::{KeelPaths, KnowledgeStores, SessionStore};
use keel_security::{AuditLogger, AuditOutcome};
use keel_tools::QuestionOption;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ── Mock Model ───────────────────────────────────────────────────────────

/// A model that replays scripted turns in sequence and records requests.
struct ScriptedModel {
    turns: Mutex<VecDeque<Vec<StreamEvent>>>,
    summaries: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    fn new(turns: Vec<Vec<StreamEvent>>) -> Arc<Self> {
        Self::with_summaries(turns, Vec::new())
    }

    fn with_summaries(turns: Vec<Vec<StreamEvent>>, summaries: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            summaries: Mutex::new(summaries.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn stream(
        &self,
        request: ModelRequest,
        _cancel: CancellationToken,
    ) -> Result<ModelStream, ProviderError> {
        let call = self.calls();
        self.requests.lock().unwrap().push(request);
        let events = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedModel exhausted at call #{call}"));

        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(Ok(event)).unwrap();
        }
        Ok(rx)
    }

    async fn summarize(
        &self,
        _model: &str,
        _messages: &[Message],
        _instruction: &str,
    ) -> Result<String, ProviderError> {
        self.summaries
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ServiceUnavailable("no summary scripted".into()))
    }
}

const USAGE: Usage = Usage {
    input_tokens: 10,
    output_tokens: 5,
};

fn text_turn(text: &str) -> Vec<StreamEvent> {
    vec![
        StreamEvent::TextDelta(text.to_string()),
        StreamEvent::Finish(TurnOutcome {
            messages: vec![Message::assistant(text)],
            usage: USAGE,
            finish_reason: FinishReason::Stop,
        }),
    ]
}

fn tool_turn(calls: Vec<ToolCall>) -> Vec<StreamEvent> {
    let mut events: Vec<StreamEvent> = calls.iter().cloned().map(StreamEvent::ToolCall).collect();
    events.push(StreamEvent::Finish(TurnOutcome {
        messages: vec![Message::assistant_with_calls("", calls)],
        usage: USAGE,
        finish_reason: FinishReason::ToolCalls,
    }));
    events
}

fn make_tool_call(id: &str, name: &str, input: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, input)
}

// ── Terminal doubles ─────────────────────────────────────────────────────

/// Answers prompts from a script; panics on a prompt nobody expected.
#[derive(Default)]
struct ScriptedUser {
    approvals: VecDeque<bool>,
    prompts: Vec<String>,
}

impl ScriptedUser {
    fn approving(approvals: &[bool]) -> Self {
        Self {
            approvals: approvals.iter().copied().collect(),
            prompts: Vec::new(),
        }
    }
}

#[async_trait]
impl InteractionResponder for ScriptedUser {
    async fn approve(&mut self, call: &ToolCall) -> bool {
        self.prompts.push(call.name.clone());
        self.approvals
            .pop_front()
            .unwrap_or_else(|| panic!("unexpected permission prompt for {}", call.name))
    }

    async fn answer(&mut self, question: &str, options: &[QuestionOption]) -> String {
        self.prompts.push(question.to_string());
        options.last().map(|o| o.label.clone()).unwrap_or_default()
    }
}

#[derive(Default)]
struct Transcript {
    text: String,
    shell: String,
    errors: Vec<String>,
}

impl AgentObserver for Transcript {
    fn on_text_delta(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn on_shell_output(&mut self, chunk: &str) {
        self.shell.push_str(chunk);
    }

    fn on_error(&mut self, error: &LoopError) {
        self.errors.push(error.to_string());
    }
}

// ── Workspace ────────────────────────────────────────────────────────────

struct Workspace {
    _dir: TempDir,
    paths: KeelPaths,
    audit: Arc<AuditLogger>,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let paths = KeelPaths::new(dir.path().join("project"), dir.path().join("home"));
        std::fs::create_dir_all(paths.project_root()).unwrap();
        Self {
            _dir: dir,
            paths,
            audit: Arc::new(AuditLogger::new()),
        }
    }

    fn root(&self) -> &Path {
        self.paths.project_root()
    }

    /// A fresh agent, as a new `keel` process would build it.
    async fn agent(&self, model: Arc<ScriptedModel>, trust_mode: bool) -> AgentLoop {
        let stores = Arc::new(KnowledgeStores::init(&self.paths, 90).await);
        let catalog = Arc::new(keel_tools::default_catalog(self.root(), stores.clone()));
        let options = LoopOptions {
            model: "anthropic:claude-sonnet-4-5".into(),
            trust_mode,
            max_turns: 10,
        };
        AgentLoop::new(model, catalog, self.paths.clone(), stores, options).with_audit(self.audit.clone())
    }
}

fn tool_results(state: &ConversationState) -> Vec<(String, String)> {
    state
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| (m.tool_call_id.clone().unwrap_or_default(), m.content.clone()))
        .collect()
}

// ── E2E: Permission gate ─────────────────────────────────────────────────

#[tokio::test]
async fn e2e_compound_destructive_command_is_denied_without_prompting() {
    let ws = Workspace::new();
    let model = ScriptedModel::new(vec![
        tool_turn(vec![make_tool_call(
            "c1",
            names::SHELL,
            json!({"command": "ls && rm -rf /tmp/x"}),
        )]),
        text_turn("I won't delete that directory."),
    ]);
    let agent = ws.agent(model.clone(), false).await;
    let mut user = ScriptedUser::default();
    let mut transcript = Transcript::default();

    let state = agent
        .run("tidy up", None, CancellationToken::new(), &mut transcript, &mut user)
        .await;

    assert!(user.prompts.is_empty(), "deny must not prompt");
    assert_eq!(
        tool_results(&state),
        vec![("c1".to_string(), "Permission denied by user.".to_string())]
    );
    assert_eq!(model.calls(), 2);
    assert_eq!(
        model.requests()[1].messages.last().unwrap().content,
        "Permission denied by user."
    );
    assert_eq!(ws.audit.entries_by_outcome(AuditOutcome::Denied).len(), 1);
    assert_eq!(transcript.text, "I won't delete that directory.");
    assert!(transcript.errors.is_empty());
}

#[tokio::test]
async fn e2e_trust_mode_still_denies_destructive_commands() {
    let ws = Workspace::new();
    let model = ScriptedModel::new(vec![
        tool_turn(vec![make_tool_call("c1", names::SHELL, json!({"command": "sudo reboot"}))]),
        text_turn("Skipped."),
    ]);
    let agent = ws.agent(model, true).await;
    let mut user = ScriptedUser::default();

    let state = agent
        .run("restart", None, CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;

    assert!(user.prompts.is_empty());
    assert_eq!(tool_results(&state)[0].1, "Permission denied by user.");
}

#[tokio::test]
async fn e2e_approved_write_then_declined_edit() {
    let ws = Workspace::new();
    let model = ScriptedModel::new(vec![
        tool_turn(vec![make_tool_call(
            "w1",
            names::WRITE_FILE,
            json!({"file_path": "src/lib.rs", "content": "pub fn one() -> u8 { 1 }\n"}),
        )]),
        tool_turn(vec![make_tool_call(
            "e1",
            names::EDIT,
            json!({"file_path": "src/lib.rs", "old_string": "1 }", "new_string": "2 }"}),
        )]),
        text_turn("Created src/lib.rs."),
    ]);
    let agent = ws.agent(model, false).await;
    let mut user = ScriptedUser::approving(&[true, false]);

    let state = agent
        .run("add a lib", None, CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;

    let written = ws.root().join("src").join("lib.rs");
    assert_eq!(std::fs::read_to_string(&written).unwrap(), "pub fn one() -> u8 { 1 }\n");
    assert_eq!(user.prompts, vec![names::WRITE_FILE, names::EDIT]);

    let results = tool_results(&state);
    assert!(results[0].1.starts_with("File written:"));
    assert_eq!(results[1].1, "Permission denied by user.");
    assert!(state.files_modified.contains(&written));
    assert_eq!(state.files_modified.len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn e2e_approved_shell_command_streams_output() {
    let ws = Workspace::new();
    let model = ScriptedModel::new(vec![
        tool_turn(vec![make_tool_call(
            "s1",
            names::SHELL,
            json!({"command": "echo built > out.txt && echo hello"}),
        )]),
        text_turn("Done."),
    ]);
    let agent = ws.agent(model, false).await;
    let mut user = ScriptedUser::approving(&[true]);
    let mut transcript = Transcript::default();

    let state = agent
        .run("build it", None, CancellationToken::new(), &mut transcript, &mut user)
        .await;

    let result = &tool_results(&state)[0].1;
    assert!(result.starts_with("exit code: 0"), "{result}");
    assert!(result.contains("hello"));
    assert!(transcript.shell.contains("hello"));
    assert_eq!(std::fs::read_to_string(ws.root().join("out.txt")).unwrap().trim(), "built");
}

// ── E2E: Plan mode ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_plan_mode_across_two_messages() {
    let ws = Workspace::new();
    let model = ScriptedModel::new(vec![
        tool_turn(vec![make_tool_call("p1", names::ENTER_PLAN_MODE, json!({}))]),
        text_turn("Exploring the codebase."),
        tool_turn(vec![make_tool_call("p2", names::EXIT_PLAN_MODE, json!({}))]),
        text_turn("The plan is ready."),
    ]);
    let agent = ws.agent(model.clone(), false).await;
    let mut user = ScriptedUser::default();

    let state = agent
        .run("design a parser", None, CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;
    assert!(state.plan_mode);
    let plan_id = state.plan_id.clone().unwrap();
    assert!(tool_results(&state)[0].1.starts_with("Plan mode activated. Plan ID: "));
    assert!(model.requests()[1].system_prompt.contains("Plan mode is active"));

    let plan_file = ws.paths.plans_dir().join(format!("{plan_id}.md"));
    std::fs::write(&plan_file, "1. Add a tokenizer\n2. Add tests").unwrap();

    let state = agent
        .run("looks good, finish", Some(state), CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;

    assert!(!state.plan_mode);
    assert_eq!(
        tool_results(&state)[1].1,
        "Plan ready for review:\n\n1. Add a tokenizer\n2. Add tests"
    );
    let requests = model.requests();
    assert!(requests[2].system_prompt.contains("Plan mode is active"));
    assert!(!requests[3].system_prompt.contains("Plan mode is active"));
    assert_eq!(list_plans(&ws.paths.plans_dir()), vec![plan_id]);
    assert!(user.prompts.is_empty());
}

// ── E2E: Memory and sessions ─────────────────────────────────────────────

#[tokio::test]
async fn e2e_saved_knowledge_reaches_the_next_message() {
    let ws = Workspace::new();
    let model = ScriptedModel::new(vec![
        tool_turn(vec![make_tool_call(
            "k1",
            names::SAVE_KNOWLEDGE,
            json!({
                "action": "add", "key": "test-command", "fact": "cargo nextest run",
                "scope": "project", "category": "commands"
            }),
        )]),
        text_turn("Noted."),
        text_turn("Use cargo nextest run."),
    ]);
    let agent = ws.agent(model.clone(), false).await;
    let mut user = ScriptedUser::default();

    let state = agent
        .run("we test with nextest", None, CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;
    assert_eq!(
        tool_results(&state)[0].1,
        "Knowledge saved: [commands] test-command: cargo nextest run"
    );
    let memory = std::fs::read_to_string(ws.paths.project_dir().join("memory").join("auto.md")).unwrap();
    assert!(memory.contains("test-command: cargo nextest run"));

    agent
        .run("how do I test?", Some(state), CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;
    let requests = model.requests();
    assert!(!requests[0].system_prompt.contains("test-command"));
    assert!(requests[2].system_prompt.contains("test-command: cargo nextest run"));
}

#[tokio::test]
async fn e2e_next_session_sees_previous_summary() {
    let ws = Workspace::new();
    let first = ScriptedModel::with_summaries(
        vec![text_turn("Fixed the off-by-one in the lexer.")],
        vec![
            r#"{"title":"Lexer fix","summary":"Fixed an off-by-one.","keyResults":["lexer fixed"],"pendingWork":["add regression test"],"decisions":[],"status":"in_progress"}"#,
        ],
    );
    let agent = ws.agent(first, false).await;
    let mut user = ScriptedUser::default();

    let state = agent
        .run("fix the lexer", None, CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;
    agent.save_session(&state).await;

    let sessions = SessionStore::new(ws.paths.sessions_dir());
    let latest = sessions.load_latest().unwrap();
    assert_eq!(latest.title, "Lexer fix");
    assert_eq!(latest.id, state.session_id);
    assert_eq!(sessions.list().len(), 1);

    let second = ScriptedModel::new(vec![text_turn("Adding the regression test.")]);
    let agent = ws.agent(second.clone(), false).await;
    agent
        .run("continue", None, CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;

    let prompt = &second.requests()[0].system_prompt;
    assert!(prompt.contains("### Previous Session"));
    assert!(prompt.contains("Title: Lexer fix"));
    assert!(prompt.contains("- add regression test"));
}

#[tokio::test]
async fn e2e_continued_conversation_accumulates_usage() {
    let ws = Workspace::new();
    let model = ScriptedModel::new(vec![text_turn("Hi."), text_turn("Still here.")]);
    let agent = ws.agent(model.clone(), false).await;
    let mut user = ScriptedUser::default();

    let state = agent
        .run("hello", None, CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;
    let session_id = state.session_id.clone();
    let state = agent
        .run("still there?", Some(state), CancellationToken::new(), &mut Transcript::default(), &mut user)
        .await;

    assert_eq!(state.session_id, session_id);
    assert_eq!(state.turn_count, 2);
    assert_eq!(state.usage.input_tokens, 20);
    assert_eq!(state.usage.output_tokens, 10);
    assert!(state.usage.estimated_cost > 0.0);
    assert_eq!(state.messages.len(), 4);
    assert_eq!(model.requests()[1].messages.len(), 3);
    assert_eq!(state.last_answer(), Some("Still here."));
}
