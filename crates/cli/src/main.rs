//! keel CLI: the main entry point.
//!
//! Commands:
//! - `keel [PROMPT]`: interactive chat, or a single run with `--print`
//! - `memory`: inspect and edit auto memory
//! - `session`: show saved session summaries
//! - `plans`: list or print saved plans
//! - `config`: create or show the config file

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "keel",
    about = "keel — an AI coding assistant for the terminal",
    version,
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Initial message; with --print, the only message
    prompt: Option<String>,

    /// Model id or alias (e.g. `sonnet`, `openai:gpt-4.1`)
    #[arg(short, long)]
    model: Option<String>,

    /// Run write and shell tools without asking (destructive commands stay denied)
    #[arg(short, long)]
    trust: bool,

    /// Maximum model turns for the session
    #[arg(long)]
    max_turns: Option<u32>,

    /// Answer once and exit
    #[arg(short, long)]
    print: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and edit auto memory
    Memory {
        #[command(subcommand)]
        action: commands::memory::MemoryAction,
    },

    /// Show saved session summaries
    Session {
        #[command(subcommand)]
        action: commands::session::SessionAction,
    },

    /// List saved plans, or print one
    Plans {
        /// Plan id to print
        id: Option<String>,
    },

    /// Create or show the config file
    Config {
        #[command(subcommand)]
        action: commands::config_cmd::ConfigAction,
    },
}

fn init_tracing(verbose: bool, json: bool) {
    let default = if verbose { "keel=debug" } else { "keel=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    match cli.command {
        Some(Commands::Memory { action }) => commands::memory::run(action).await?,
        Some(Commands::Session { action }) => commands::session::run(action)?,
        Some(Commands::Plans { id }) => commands::plans::run(id.as_deref())?,
        Some(Commands::Config { action }) => commands::config_cmd::run(action)?,
        None => {
            commands::chat::run(commands::chat::ChatArgs {
                prompt: cli.prompt,
                model: cli.model,
                trust: cli.trust,
                max_turns: cli.max_turns,
                print: cli.print,
            })
            .await?
        }
    }

    Ok(())
}
