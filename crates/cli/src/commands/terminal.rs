//! Terminal side of a run: streamed output and interaction prompts.
//!
//! The answer goes to stdout; tool activity, prompts and errors go to
//! stderr so `keel -p ... > out.md` captures only the answer.

use async_trait::async_trait;
use keel_agent::{AgentObserver, InteractionResponder, LoopError};
use keel_core::message::ToolCall;
use keel_core::state::TokenUsage;
use keel_tools::QuestionOption;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

/// Longest tool result preview shown under a tool call.
const RESULT_PREVIEW_CHARS: usize = 120;

/// Streams a run to the terminal.
#[derive(Default)]
pub struct TerminalObserver {
    mid_line: bool,
    last_usage: Option<TokenUsage>,
}

impl TerminalObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// End the streamed answer with a newline if it didn't.
    pub fn finish_answer(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    pub fn last_usage(&self) -> Option<&TokenUsage> {
        self.last_usage.as_ref()
    }
}

impl AgentObserver for TerminalObserver {
    fn on_text_delta(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
        self.mid_line = !text.ends_with('\n');
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        self.finish_answer();
        eprintln!("  ⚙ {}", describe_call(call));
    }

    fn on_tool_result(&mut self, _call_id: &str, text: &str) {
        eprintln!("    ↳ {}", preview(text));
    }

    fn on_shell_output(&mut self, chunk: &str) {
        eprint!("{chunk}");
    }

    fn on_usage_update(&mut self, usage: &TokenUsage) {
        self.last_usage = Some(usage.clone());
    }

    fn on_context_compressed(&mut self, note: &str) {
        self.finish_answer();
        eprintln!("  ℹ {note}");
    }

    fn on_error(&mut self, error: &LoopError) {
        self.finish_answer();
        eprintln!("  ❌ {error}");
    }
}

/// `name detail` for the one argument that identifies a call.
pub fn describe_call(call: &ToolCall) -> String {
    let detail = ["command", "file_path", "path", "pattern", "url", "query", "question"]
        .iter()
        .find_map(|key| call.str_arg(key));
    match detail {
        Some(detail) => format!("{} {detail}", call.name),
        None => call.name.clone(),
    }
}

fn preview(text: &str) -> String {
    let first = text.lines().next().unwrap_or_default();
    let mut shown: String = first.chars().take(RESULT_PREVIEW_CHARS).collect();
    if shown.len() < first.len() || text.lines().nth(1).is_some() {
        shown.push_str(" …");
    }
    shown
}

/// Line-oriented stdin shared by the REPL and the interaction prompts.
pub struct TerminalInput {
    lines: Lines<BufReader<Stdin>>,
}

impl Default for TerminalInput {
    fn default() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl TerminalInput {
    /// Show `prompt` on stderr and read one line. `None` at end of input.
    pub async fn read_line(&mut self, prompt: &str) -> Option<String> {
        eprint!("{prompt}");
        let _ = std::io::stderr().flush();
        match self.lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read from stdin");
                None
            }
        }
    }
}

#[async_trait]
impl InteractionResponder for TerminalInput {
    async fn approve(&mut self, call: &ToolCall) -> bool {
        eprintln!();
        eprintln!("  🔐 {}", describe_call(call));
        let reply = self.read_line("  Allow? [y/N] ").await.unwrap_or_default();
        is_yes(&reply)
    }

    async fn answer(&mut self, question: &str, options: &[QuestionOption]) -> String {
        eprintln!();
        eprintln!("  ❓ {question}");
        for (i, option) in options.iter().enumerate() {
            if option.description.is_empty() {
                eprintln!("    {}. {}", i + 1, option.label);
            } else {
                eprintln!("    {}. {} — {}", i + 1, option.label, option.description);
            }
        }
        let reply = self
            .read_line("  Choose a number or type an answer: ")
            .await
            .unwrap_or_default();
        pick_option(&reply, options)
    }
}

fn is_yes(reply: &str) -> bool {
    matches!(reply.trim().to_lowercase().as_str(), "y" | "yes")
}

/// A number selects that option's label, empty selects the first, anything
/// else is a free-form answer.
fn pick_option(reply: &str, options: &[QuestionOption]) -> String {
    let reply = reply.trim();
    if reply.is_empty() {
        return options.first().map(|o| o.label.clone()).unwrap_or_default();
    }
    reply
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| options.get(i))
        .map_or_else(|| reply.to_string(), |o| o.label.clone())
}
