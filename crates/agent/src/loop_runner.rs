//! The agent loop: one state machine per user message.
//!
//! [`AgentLoop::start`] appends the user message and returns an
//! [`AgentRun`]. Each call to [`AgentRun::advance`] drives turns and tool
//! dispatch until the run finishes or needs a human: a permission prompt
//! or an `ask_user` question. The caller answers with
//! [`AgentRun::resume`] and advances again. [`AgentLoop::run`] does the
//! same with an [`InteractionResponder`].
//!
//! Tool calls are handled strictly one at a time in emission order. Every
//! call gets exactly one result message before the next model turn.

use chrono::Utc;
use keel_core::error::{ProviderError, ToolError};
use keel_core::message::{Message, ToolCall};
use keel_core::model::{FinishReason, ModelClient, ModelRequest, StreamEvent, TurnOutcome};
use keel_core::state::ConversationState;
use keel_core::tool::{
    ControlTool, GatedTool, InteractiveTool, ToolCatalog, ToolKind, truncate_tool_result,
};
use keel_memory::{
    KeelPaths, KnowledgeStores, SessionStore, format_session_for_prompt, generate_summary,
    load_knowledge_context, rule_mentions,
};
use keel_security::{AuditEvent, AuditLogger, AuditOutcome, classify};
use keel_telemetry::{PricingTable, record_usage};
use keel_tools::{GatedExecutor, QuestionOption, parse_question};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::context::{KEEP_RECENT, compress_messages, estimate_tokens, token_budget};
use crate::observer::{AgentObserver, InteractionResponder, LoopError};
use crate::plan_mode::{enter_plan_mode, exit_plan_mode, plan_path};
use crate::prompt::{PromptEnv, build_system_prompt};
use crate::recovery::{ErrorKind, classify_model_error};

pub const PERMISSION_DENIED: &str = "Permission denied by user.";
pub const TOOL_CALL_CANCELLED: &str = "Tool call cancelled.";
pub const CONTEXT_COMPRESSED: &str = "Context compressed to fit token budget.";

/// Per-session options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOptions {
    /// Full model id, `provider:model`
    pub model: String,
    /// Run `ask` calls without prompting (`deny` still wins)
    pub trust_mode: bool,
    /// Model turns allowed over the whole conversation
    pub max_turns: u32,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            model: String::new(),
            trust_mode: false,
            max_turns: 100,
        }
    }
}

/// Something only a human can decide.
#[derive(Debug, Clone)]
pub enum Interaction {
    /// Approve a write or command the gate classified as `ask`.
    Permission { call: ToolCall },
    /// Answer an `ask_user` question.
    Question {
        call_id: String,
        question: String,
        options: Vec<QuestionOption>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionAnswer {
    Approval(bool),
    Choice(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResumeError {
    #[error("no interaction is pending")]
    NotWaiting,
    #[error("answer does not match the pending interaction")]
    Mismatch,
}

#[derive(Debug, Clone)]
pub enum RunStatus {
    Pending(Interaction),
    Finished,
}

/// The agent loop controller for one session.
pub struct AgentLoop {
    client: Arc<dyn ModelClient>,
    catalog: Arc<ToolCatalog>,
    executor: GatedExecutor,
    paths: KeelPaths,
    stores: Arc<KnowledgeStores>,
    sessions: SessionStore,
    pricing: PricingTable,
    audit: Arc<AuditLogger>,
    options: LoopOptions,
    prompt_env: PromptEnv,
}

impl AgentLoop {
    pub fn new(
        client: Arc<dyn ModelClient>,
        catalog: Arc<ToolCatalog>,
        paths: KeelPaths,
        stores: Arc<KnowledgeStores>,
        options: LoopOptions,
    ) -> Self {
        Self {
            client,
            catalog,
            executor: GatedExecutor::new(paths.project_root()),
            sessions: SessionStore::new(paths.sessions_dir()),
            prompt_env: PromptEnv::detect(paths.project_root()),
            paths,
            stores,
            pricing: PricingTable::with_defaults(),
            audit: Arc::new(AuditLogger::tracing()),
            options,
        }
    }

    pub fn with_executor(mut self, executor: GatedExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_prompt_env(mut self, env: PromptEnv) -> Self {
        self.prompt_env = env;
        self
    }

    pub fn options(&self) -> &LoopOptions {
        &self.options
    }

    pub fn paths(&self) -> &KeelPaths {
        &self.paths
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Begin a run for `user_text`, continuing `prior` when given.
    pub fn start(
        &self,
        user_text: &str,
        prior: Option<ConversationState>,
        cancel: CancellationToken,
    ) -> AgentRun<'_> {
        let mut state = prior.unwrap_or_default();
        state.messages.push(Message::user(user_text));
        info!(
            session_id = %state.session_id,
            model = %self.options.model,
            messages = state.messages.len(),
            "Starting agent run"
        );
        AgentRun {
            agent: self,
            state,
            cancel,
            user_text: user_text.to_string(),
            knowledge: None,
            phase: Phase::NeedsTurn,
            queue: VecDeque::new(),
        }
    }

    /// Drive a whole run, answering interactions with `responder`.
    ///
    /// Always returns the accumulated state; failures go to
    /// `observer.on_error`.
    pub async fn run(
        &self,
        user_text: &str,
        prior: Option<ConversationState>,
        cancel: CancellationToken,
        observer: &mut dyn AgentObserver,
        responder: &mut dyn InteractionResponder,
    ) -> ConversationState {
        let mut run = self.start(user_text, prior, cancel.clone());
        while let RunStatus::Pending(interaction) = run.advance(observer).await {
            let answer = tokio::select! {
                _ = cancel.cancelled() => continue,
                answer = respond(responder, &interaction) => answer,
            };
            if let Err(e) = run.resume(answer) {
                warn!(error = %e, "Responder answer rejected");
            }
        }
        run.into_state()
    }

    /// Route later runs to `model` through `client`.
    pub fn switch_model(&mut self, client: Arc<dyn ModelClient>, model: String) {
        info!(from = %self.options.model, to = %model, "Switching model");
        self.client = client;
        self.options.model = model;
    }

    /// Compress `state` now, whatever its size. Returns `false` when every
    /// message is recent enough to keep.
    pub async fn compact(&self, state: &mut ConversationState) -> Result<bool, ProviderError> {
        if state.messages.len() <= KEEP_RECENT {
            return Ok(false);
        }
        state.messages =
            compress_messages(self.client.as_ref(), &self.options.model, &state.messages).await?;
        Ok(true)
    }

    /// Summarize `state` and save it as the latest session. Best-effort.
    pub async fn save_session(&self, state: &ConversationState) {
        if state.messages.is_empty() {
            return;
        }
        let summary = generate_summary(
            self.client.as_ref(),
            &self.options.model,
            &state.messages,
            &state.session_id,
            state.started_at,
            &state.files_modified,
        )
        .await;
        match self.sessions.save(&summary) {
            Ok(()) => info!(session_id = %summary.id, title = %summary.title, "Session saved"),
            Err(e) => warn!(error = %e, "Failed to save session"),
        }
    }
}

async fn respond(
    responder: &mut dyn InteractionResponder,
    interaction: &Interaction,
) -> InteractionAnswer {
    match interaction {
        Interaction::Permission { call } => InteractionAnswer::Approval(responder.approve(call).await),
        Interaction::Question {
            question, options, ..
        } => InteractionAnswer::Choice(responder.answer(question, options).await),
    }
}

enum Phase {
    NeedsTurn,
    Dispatching,
    Awaiting(Pending),
    Resuming(Resolution),
    Done,
}

struct Pending {
    call: ToolCall,
    interaction: Interaction,
    /// `None` for a question
    gated: Option<GatedTool>,
}

enum Resolution {
    Approval {
        call: ToolCall,
        tool: GatedTool,
        approved: bool,
    },
    Answer {
        call: ToolCall,
        answer: String,
    },
}

/// One run of the loop. Owns the conversation state until
/// [`into_state`](Self::into_state).
pub struct AgentRun<'a> {
    agent: &'a AgentLoop,
    state: ConversationState,
    cancel: CancellationToken,
    user_text: String,
    knowledge: Option<String>,
    phase: Phase,
    queue: VecDeque<ToolCall>,
}

impl AgentRun<'_> {
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// The interaction waiting for an answer, if any.
    pub fn pending(&self) -> Option<&Interaction> {
        match &self.phase {
            Phase::Awaiting(pending) => Some(&pending.interaction),
            _ => None,
        }
    }

    /// Run until the loop finishes or needs an answer.
    ///
    /// Calling it again while an interaction is pending returns the same
    /// interaction.
    pub async fn advance(&mut self, observer: &mut dyn AgentObserver) -> RunStatus {
        loop {
            if self.cancel.is_cancelled() && !matches!(self.phase, Phase::Done) {
                self.phase = self.abort(observer);
                return RunStatus::Finished;
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::NeedsTurn => self.phase = self.take_turn(observer).await,
                Phase::Dispatching => {
                    self.phase = match self.queue.pop_front() {
                        Some(call) => self.dispatch(call, observer).await,
                        None => Phase::NeedsTurn,
                    };
                }
                Phase::Awaiting(pending) => {
                    let interaction = pending.interaction.clone();
                    self.phase = Phase::Awaiting(pending);
                    return RunStatus::Pending(interaction);
                }
                Phase::Resuming(resolution) => self.phase = self.complete(resolution, observer).await,
                Phase::Done => return RunStatus::Finished,
            }
        }
    }

    /// Answer the pending interaction. A mismatched answer leaves the run
    /// unchanged.
    pub fn resume(&mut self, answer: InteractionAnswer) -> Result<(), ResumeError> {
        match (std::mem::replace(&mut self.phase, Phase::Done), answer) {
            (
                Phase::Awaiting(Pending {
                    call,
                    gated: Some(tool),
                    ..
                }),
                InteractionAnswer::Approval(approved),
            ) => {
                self.phase = Phase::Resuming(Resolution::Approval {
                    call,
                    tool,
                    approved,
                });
                Ok(())
            }
            (Phase::Awaiting(Pending { call, gated: None, .. }), InteractionAnswer::Choice(answer)) => {
                self.phase = Phase::Resuming(Resolution::Answer { call, answer });
                Ok(())
            }
            (phase, _) => {
                let err = if matches!(phase, Phase::Awaiting(_)) {
                    ResumeError::Mismatch
                } else {
                    ResumeError::NotWaiting
                };
                self.phase = phase;
                Err(err)
            }
        }
    }

    /// Finish the run and hand back the state. Calls that never got a
    /// result are closed as cancelled.
    pub fn into_state(mut self) -> ConversationState {
        let closed = self.close_open_calls();
        if !closed.is_empty() {
            debug!(count = closed.len(), "Closed unanswered tool calls");
        }
        self.state
    }

    async fn take_turn(&mut self, observer: &mut dyn AgentObserver) -> Phase {
        let agent = self.agent;
        let model = agent.options.model.as_str();

        if self.state.turn_count >= agent.options.max_turns {
            let err = LoopError::TurnLimit(agent.options.max_turns);
            warn!(max_turns = agent.options.max_turns, "Turn limit reached");
            observer.on_error(&err);
            return Phase::Done;
        }
        self.state.turn_count += 1;

        let estimated = estimate_tokens(&self.state.messages);
        let budget = token_budget(model);
        debug!(turn = self.state.turn_count, tokens = estimated, budget, "Starting turn");
        if estimated > budget && self.state.messages.len() <= KEEP_RECENT {
            debug!(tokens = estimated, budget, "Over token budget with no older history to compress");
        } else if estimated > budget {
            info!(tokens = estimated, budget, "Conversation over token budget, compressing");
            let cancel = self.cancel.clone();
            let state = &self.state;
            let compressed = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                compressed = async {
                    agent.save_session(state).await;
                    compress_messages(agent.client.as_ref(), model, &state.messages).await
                } => Some(compressed),
            };
            match compressed {
                None => return self.abort(observer),
                Some(Ok(compressed)) => {
                    self.state.messages = compressed;
                    observer.on_context_compressed(CONTEXT_COMPRESSED);
                }
                Some(Err(e)) => warn!(error = %e, "Compression failed, keeping full history"),
            }
        }

        let knowledge = self.knowledge().await;
        let plan_file = match (self.state.plan_mode, &self.state.plan_id) {
            (true, Some(id)) => Some(plan_path(&agent.paths.plans_dir(), id)),
            _ => None,
        };
        let request = ModelRequest {
            model: model.to_string(),
            system_prompt: build_system_prompt(&agent.prompt_env, plan_file.as_deref(), &knowledge),
            messages: self.state.messages.clone(),
            tools: agent.catalog.clone(),
        };

        let mut stream = match agent.client.stream(request, self.cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => return self.fail(e, observer),
        };

        let cancel = self.cancel.clone();
        let outcome = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abort(observer),
                event = stream.recv() => event,
            };
            match event {
                Some(Ok(StreamEvent::TextDelta(text))) => observer.on_text_delta(&text),
                Some(Ok(StreamEvent::ToolCall(call))) => observer.on_tool_call(&call),
                Some(Ok(StreamEvent::ToolResult { call_id, text })) => {
                    observer.on_tool_result(&call_id, &truncate_tool_result(&text));
                }
                Some(Ok(StreamEvent::Finish(outcome))) => break outcome,
                Some(Err(e)) => return self.fail(e, observer),
                None => {
                    let e = ProviderError::StreamInterrupted("stream ended before the turn finished".into());
                    return self.fail(e, observer);
                }
            }
        };

        let calls = outcome.tool_calls();
        let TurnOutcome {
            messages,
            usage,
            finish_reason,
        } = outcome;
        let answered: HashSet<String> = messages
            .iter()
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        self.state.messages.extend(messages);

        record_usage(&mut self.state.usage, model, usage, &agent.pricing);
        observer.on_usage_update(&self.state.usage);
        debug!(
            turn = self.state.turn_count,
            ?finish_reason,
            calls = calls.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "Turn finished"
        );

        if finish_reason != FinishReason::ToolCalls {
            return Phase::Done;
        }
        self.queue
            .extend(calls.into_iter().filter(|call| !answered.contains(&call.id)));
        Phase::Dispatching
    }

    async fn dispatch(&mut self, call: ToolCall, observer: &mut dyn AgentObserver) -> Phase {
        let agent = self.agent;
        let Some(kind) = agent.catalog.kind(&call.name) else {
            warn!(tool = %call.name, "Model called an unknown tool");
            let text = format!("Error: unknown tool '{}'", call.name);
            self.push_result(&call.id, text, observer);
            return Phase::Dispatching;
        };

        match kind {
            ToolKind::AutoExecuted(_) => {
                // The client answers these itself; this call came back without a result.
                debug!(tool = %call.name, "Executing auto tool the client left unanswered");
                let cancel = self.cancel.clone();
                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = agent.catalog.execute_auto(&call) => result,
                };
                match result {
                    Some(text) => self.push_result(&call.id, truncate_tool_result(&text), observer),
                    None => {
                        self.push_result(&call.id, TOOL_CALL_CANCELLED.into(), observer);
                        return self.abort(observer);
                    }
                }
                Phase::Dispatching
            }
            ToolKind::Control(ControlTool::EnterPlanMode) => {
                let text = enter_plan_mode(&mut self.state, &agent.paths.plans_dir(), Utc::now()).await;
                self.push_result(&call.id, text, observer);
                Phase::Dispatching
            }
            ToolKind::Control(ControlTool::ExitPlanMode) => {
                let text = exit_plan_mode(&mut self.state, &agent.paths.plans_dir()).await;
                self.push_result(&call.id, text, observer);
                Phase::Dispatching
            }
            ToolKind::Interactive(InteractiveTool::AskUser) => {
                let (question, options) = parse_question(&call.input);
                Phase::Awaiting(Pending {
                    interaction: Interaction::Question {
                        call_id: call.id.clone(),
                        question,
                        options,
                    },
                    call,
                    gated: None,
                })
            }
            ToolKind::PermissionGated(tool) => {
                let tool = *tool;
                let trust_mode = agent.options.trust_mode;
                let decision = classify(&call.name, &call.input);
                match decision.resolve(trust_mode) {
                    Some(allowed) => {
                        agent.audit.log(
                            AuditEvent::GateDecision {
                                decision,
                                trust_mode,
                            },
                            &call.name,
                            AuditOutcome::from_allowed(allowed),
                            audit_detail(&call),
                        );
                        self.run_gated(tool, call, allowed, observer).await
                    }
                    None => Phase::Awaiting(Pending {
                        interaction: Interaction::Permission { call: call.clone() },
                        call,
                        gated: Some(tool),
                    }),
                }
            }
        }
    }

    async fn complete(&mut self, resolution: Resolution, observer: &mut dyn AgentObserver) -> Phase {
        match resolution {
            Resolution::Approval {
                call,
                tool,
                approved,
            } => {
                self.agent.audit.log(
                    AuditEvent::UserApproval,
                    &call.name,
                    AuditOutcome::from_allowed(approved),
                    audit_detail(&call),
                );
                self.run_gated(tool, call, approved, observer).await
            }
            Resolution::Answer { call, answer } => {
                self.push_result(&call.id, format!("User answered: {answer}"), observer);
                Phase::Dispatching
            }
        }
    }

    async fn run_gated(
        &mut self,
        tool: GatedTool,
        call: ToolCall,
        allowed: bool,
        observer: &mut dyn AgentObserver,
    ) -> Phase {
        if !allowed {
            info!(tool = %call.name, "Tool call denied");
            self.push_result(&call.id, PERMISSION_DENIED.into(), observer);
            return Phase::Dispatching;
        }

        let result = {
            let mut forward = |chunk: &str| observer.on_shell_output(chunk);
            self.agent
                .executor
                .execute(tool, &call, &self.cancel, &mut forward)
                .await
        };

        match result {
            Ok(outcome) => {
                if let Some(path) = outcome.modified {
                    info!(path = %path.display(), "File modified");
                    self.state.files_modified.insert(path);
                }
                self.push_result(&call.id, truncate_tool_result(&outcome.text), observer);
                Phase::Dispatching
            }
            Err(ToolError::Cancelled(_)) => {
                self.push_result(&call.id, TOOL_CALL_CANCELLED.into(), observer);
                self.abort(observer)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                self.push_result(&call.id, format!("Error: {e}"), observer);
                Phase::Dispatching
            }
        }
    }

    /// Model error: report it and end the run.
    fn fail(&mut self, e: ProviderError, observer: &mut dyn AgentObserver) -> Phase {
        let classified = classify_model_error(&e);
        if classified.kind == ErrorKind::Cancelled {
            return self.abort(observer);
        }
        error!(kind = ?classified.kind, retryable = classified.retryable, error = %e, "Model turn failed");
        observer.on_error(&LoopError::Model(classified));
        for id in self.close_open_calls() {
            observer.on_tool_result(&id, TOOL_CALL_CANCELLED);
        }
        Phase::Done
    }

    /// Cancellation: close every open call and end the run.
    fn abort(&mut self, observer: &mut dyn AgentObserver) -> Phase {
        info!(session_id = %self.state.session_id, "Run cancelled");
        for id in self.close_open_calls() {
            observer.on_tool_result(&id, TOOL_CALL_CANCELLED);
        }
        observer.on_error(&LoopError::Cancelled);
        Phase::Done
    }

    /// Give the pending call and every queued call a cancelled result.
    fn close_open_calls(&mut self) -> Vec<String> {
        let mut open = Vec::new();
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Awaiting(Pending { call, .. })
            | Phase::Resuming(Resolution::Approval { call, .. })
            | Phase::Resuming(Resolution::Answer { call, .. }) => open.push(call),
            _ => {}
        }
        open.extend(self.queue.drain(..));

        open.into_iter()
            .map(|call| {
                self.state
                    .messages
                    .push(Message::tool_result(&call.id, TOOL_CALL_CANCELLED));
                call.id
            })
            .collect()
    }

    fn push_result(&mut self, call_id: &str, text: String, observer: &mut dyn AgentObserver) {
        observer.on_tool_result(call_id, &text);
        self.state.messages.push(Message::tool_result(call_id, text));
    }

    /// Knowledge context for this run, built once.
    async fn knowledge(&mut self) -> String {
        if let Some(knowledge) = &self.knowledge {
            return knowledge.clone();
        }
        let agent = self.agent;
        let session = agent
            .sessions
            .load_latest()
            .map(|summary| format_session_for_prompt(&summary));
        let active: Vec<PathBuf> = self.state.files_modified.iter().cloned().collect();

        let mut knowledge =
            load_knowledge_context(&agent.paths, &agent.stores, &active, session.as_deref()).await;
        let mentions = rule_mentions(&agent.paths, &self.user_text);
        if knowledge.is_empty() {
            knowledge = mentions.trim_start().to_string();
        } else {
            knowledge.push_str(&mentions);
        }

        self.knowledge = Some(knowledge.clone());
        knowledge
    }
}

fn audit_detail(call: &ToolCall) -> Option<String> {
    call.str_arg("command")
        .or_else(|| call.str_arg("file_path"))
        .map(str::to_string)
}
