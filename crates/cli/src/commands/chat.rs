//! `keel [PROMPT]`: interactive chat, or a single run with `--print`.
//!
//! Piped stdin is prepended to the prompt.

use anyhow::{Context, anyhow};
use keel_agent::{AgentLoop, LoopOptions};
use keel_config::{AppConfig, expand_alias};
use keel_core::state::{ConversationState, TokenUsage};
use keel_memory::{KnowledgeStores, scan_project};
use keel_telemetry::{ModelPricing, PricingTable};
use keel_tools::{GatedExecutor, default_catalog};
use std::io::IsTerminal;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::slash::{self, PLAN_REQUEST, SlashCommand, parse_slash_command};
use super::terminal::{TerminalInput, TerminalObserver};

pub struct ChatArgs {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub trust: bool,
    pub max_turns: Option<u32>,
    pub print: bool,
}

pub async fn run(args: ChatArgs) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;
    let piped = read_piped_stdin().await?;
    let prompt = combine_prompt(piped.as_deref(), args.prompt);

    let model = config.resolve_model_id(args.model.as_deref()).ok_or_else(|| {
        anyhow!(
            "No model configured. Set an API key (e.g. ANTHROPIC_API_KEY) or add \
             default_model to {}",
            AppConfig::config_path().display()
        )
    })?;
    let client = keel_providers::build_client(&config, &model)?;

    let paths = super::current_paths()?;
    let root = paths.project_root().to_path_buf();
    let stores = Arc::new(KnowledgeStores::init(&paths, config.agent.memory_max_age_days).await);
    let scanned = scan_project(&root, &stores.project).await;
    debug!(facts = scanned, "Project scan finished");

    let pricing = PricingTable::with_defaults();
    for (model_id, price) in &config.pricing {
        pricing.set(model_id.clone(), ModelPricing::new(price.input_per_m, price.output_per_m));
    }

    let options = LoopOptions {
        model: model.clone(),
        trust_mode: args.trust || config.agent.trust,
        max_turns: args.max_turns.unwrap_or(config.agent.max_turns),
    };
    let catalog = Arc::new(default_catalog(&root, stores.clone()));
    let mut agent = AgentLoop::new(client, catalog, paths, stores, options)
        .with_executor(GatedExecutor::new(&root).with_shell_timeout(config.agent.shell_timeout_ms))
        .with_pricing(pricing);

    let mut observer = TerminalObserver::new();
    let mut input = TerminalInput::default();

    let state = if args.print {
        let prompt = prompt.ok_or_else(|| anyhow!("--print needs a prompt or piped input"))?;
        let state = send(&agent, &prompt, None, &mut observer, &mut input).await;
        observer.finish_answer();
        Some(state)
    } else {
        print_banner(&model, agent.options().trust_mode);
        repl(&mut agent, &config, prompt, &mut observer, &mut input).await
    };

    if let Some(state) = state {
        if let Some(usage) = observer.last_usage() {
            eprintln!("  {}", usage_line(usage));
        }
        agent.save_session(&state).await;
    }
    Ok(())
}

async fn repl(
    agent: &mut AgentLoop,
    config: &AppConfig,
    first: Option<String>,
    observer: &mut TerminalObserver,
    input: &mut TerminalInput,
) -> Option<ConversationState> {
    let mut state: Option<ConversationState> = None;
    let mut pending = first;

    loop {
        let line = match pending.take() {
            Some(line) => line,
            None => match input.read_line("\n  You > ").await {
                Some(line) => line,
                None => break,
            },
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let message = match parse_slash_command(line) {
            None => line.to_string(),
            Some(SlashCommand::Exit) => break,
            Some(SlashCommand::Plan) => PLAN_REQUEST.to_string(),
            Some(command) => {
                run_command(command, agent, config, &mut state).await;
                continue;
            }
        };

        println!();
        state = Some(send(agent, &message, state, observer, input).await);
        observer.finish_answer();
    }

    info!("Interactive session ended");
    state
}

/// Everything but `/exit` and `/plan`, which the REPL loop handles.
async fn run_command(
    command: SlashCommand,
    agent: &mut AgentLoop,
    config: &AppConfig,
    state: &mut Option<ConversationState>,
) {
    match command {
        SlashCommand::Help => println!("{}", slash::help_text()),
        SlashCommand::Model(None) => println!(
            "  Current model: {}\n\n  Available aliases:\n{}",
            agent.options().model,
            slash::alias_table()
        ),
        SlashCommand::Model(Some(raw)) => {
            let model = expand_alias(&raw);
            match keel_providers::build_client(config, &model) {
                Ok(client) => {
                    agent.switch_model(client, model.clone());
                    println!("  Model switched to: {model}");
                }
                Err(e) => println!("  Failed to switch model: {e}"),
            }
        }
        SlashCommand::Usage => {
            let usage = state.as_ref().map(|s| s.usage.clone()).unwrap_or_default();
            println!("{}", usage_report(&usage, &agent.options().model));
        }
        SlashCommand::Compact => match state.as_mut() {
            None => println!("  Nothing to compact yet."),
            Some(state) => {
                println!("  Compressing context...");
                let outcome = tokio::select! {
                    _ = tokio::signal::ctrl_c() => "Compaction cancelled.".to_string(),
                    result = agent.compact(state) => match result {
                        Ok(true) => "Context compressed.".to_string(),
                        Ok(false) => "Nothing old enough to compress.".to_string(),
                        Err(e) => format!("Compaction failed: {e}"),
                    },
                };
                println!("  {outcome}");
            }
        },
        SlashCommand::Clear => {
            *state = None;
            println!("  Conversation cleared.");
        }
        SlashCommand::SessionSave => match state.as_ref() {
            Some(state) => {
                agent.save_session(state).await;
                println!("  Session saved.");
            }
            None => println!("  No active session to save."),
        },
        SlashCommand::UnknownSession => println!("  Unknown session command. Use `/session save`."),
        SlashCommand::Unknown(name) => {
            println!("  Unknown command: /{name}. Type /help for available commands.")
        }
        SlashCommand::Plan | SlashCommand::Exit => {}
    }
}

/// One run with Ctrl-C wired to its cancellation token.
async fn send(
    agent: &AgentLoop,
    text: &str,
    prior: Option<ConversationState>,
    observer: &mut TerminalObserver,
    input: &mut TerminalInput,
) -> ConversationState {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let state = agent.run(text, prior, cancel, observer, input).await;
    watcher.abort();
    state
}

fn print_banner(model: &str, trust: bool) {
    println!();
    println!("  keel — AI coding assistant");
    println!();
    println!("  Model:  {model}");
    if trust {
        println!("  Trust:  on (writes and commands run without asking)");
    }
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type /help for commands, 'exit' or Ctrl+D to quit. Ctrl+C cancels the current reply.");
}

/// All of stdin when it is piped; `None` on a terminal.
async fn read_piped_stdin() -> anyhow::Result<Option<String>> {
    if std::io::stdin().is_terminal() {
        return Ok(None);
    }
    let mut piped = String::new();
    tokio::io::stdin()
        .read_to_string(&mut piped)
        .await
        .context("Failed to read piped stdin")?;
    Ok(Some(piped))
}

/// Piped input, then the prompt, separated by a blank line.
fn combine_prompt(piped: Option<&str>, prompt: Option<String>) -> Option<String> {
    let parts: Vec<&str> = [piped.map(str::trim), prompt.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join("\n\n"))
}

fn usage_report(usage: &TokenUsage, model: &str) -> String {
    let cost = if usage.estimated_cost > 0.0 {
        let symbol = if usage.currency == "CNY" { "¥" } else { "$" };
        format!("{symbol}{:.4}", usage.estimated_cost)
    } else {
        "N/A".to_string()
    };
    format!(
        "  Token usage\n    Input:   {} tokens\n    Output:  {} tokens\n    Total:   {} tokens\n    Cost:    {cost}\n    Model:   {model}",
        usage.input_tokens, usage.output_tokens, usage.total_tokens
    )
}

fn usage_line(usage: &TokenUsage) -> String {
    format!(
        "Tokens: {} in / {} out · ${:.4}",
        usage.input_tokens, usage.output_tokens, usage.estimated_cost
    )
}
