//! REPL slash commands.

use keel_config::MODEL_ALIASES;

/// Sent as the user message for `/plan`.
pub const PLAN_REQUEST: &str = "Please enter plan mode to explore the codebase and design an \
                                implementation plan before making changes.";

const COMMANDS: &[(&str, &str)] = &[
    ("/help", "Show this help"),
    ("/model [alias]", "Show the current model, or switch to another"),
    ("/usage", "Show token usage and cost for this session"),
    ("/compact", "Summarize older messages to free context"),
    ("/clear", "Start a new conversation"),
    ("/session save", "Save a summary of this session now"),
    ("/plan", "Ask the model to plan before changing anything"),
    ("/exit", "Save the session and quit"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Model(Option<String>),
    Usage,
    Compact,
    Clear,
    SessionSave,
    Plan,
    Exit,
    /// `/session` with anything but `save`
    UnknownSession,
    Unknown(String),
}

/// `None` when `input` is a message rather than a command.
pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    let rest = trimmed.strip_prefix('/')?;
    let mut words = rest.split_whitespace();
    let command = words.next().unwrap_or_default().to_lowercase();
    let arg = words.collect::<Vec<_>>().join(" ");

    let parsed = match command.as_str() {
        "help" => SlashCommand::Help,
        "model" => SlashCommand::Model((!arg.is_empty()).then_some(arg)),
        "usage" => SlashCommand::Usage,
        "compact" => SlashCommand::Compact,
        "clear" => SlashCommand::Clear,
        "session" if arg.eq_ignore_ascii_case("save") => SlashCommand::SessionSave,
        "session" => SlashCommand::UnknownSession,
        "plan" => SlashCommand::Plan,
        "exit" | "quit" => SlashCommand::Exit,
        _ => SlashCommand::Unknown(command),
    };
    Some(parsed)
}

pub fn help_text() -> String {
    let mut text = format!("keel v{}\n\n", env!("CARGO_PKG_VERSION"));
    for (name, description) in COMMANDS {
        text.push_str(&format!("  {name:<16} {description}\n"));
    }
    text.push_str(&format!("\nModel aliases: {}\n", alias_names().join(", ")));
    text.push_str("Keyboard: Ctrl+C cancels the current reply, Ctrl+D quits");
    text
}

/// `alias → model id`, one per line.
pub fn alias_table() -> String {
    MODEL_ALIASES
        .iter()
        .map(|(alias, id)| format!("  {alias} → {id}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn alias_names() -> Vec<&'static str> {
    MODEL_ALIASES.iter().map(|(alias, _)| *alias).collect()
}
