//! Layered knowledge context for the system prompt.
//!
//! Sections, in order: global preferences, global auto memory, project
//! knowledge, project auto memory, local preferences, rules, and the
//! previous session block.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::auto_memory::KnowledgeStores;
use crate::paths::KeelPaths;
use crate::rules::{load_rules, mentioned_rules};
use keel_core::Scope;

fn read_or_empty(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap_or_default()
}

/// Build the `## Project Knowledge` block. Empty when there is nothing to say.
pub async fn load_knowledge_context(
    paths: &KeelPaths,
    stores: &KnowledgeStores,
    active_files: &[PathBuf],
    session_context: Option<&str>,
) -> String {
    let mut sections: Vec<String> = Vec::new();
    let mut push = |heading: &str, body: String| {
        if !body.is_empty() {
            sections.push(format!("### {heading}\n{body}"));
        }
    };

    push("Global Preferences", read_or_empty(&paths.knowledge_file(Scope::Global)));
    push("Global Auto Memory", stores.global.prompt_content().await);
    push("Project Knowledge", read_or_empty(&paths.knowledge_file(Scope::Project)));
    push("Project Auto Memory", stores.project.prompt_content().await);
    push("Local Preferences", read_or_empty(&paths.local_preferences()));

    let rules = load_rules(&paths.rules_dir());
    for rule in rules.iter().filter(|r| r.always_apply) {
        sections.push(rule.section());
    }
    if !active_files.is_empty() {
        for rule in rules.iter().filter(|r| !r.paths.is_empty()) {
            if rule.matches_any(paths.project_root(), active_files) {
                sections.push(rule.section());
            }
        }
    }

    let requestable: Vec<String> = rules
        .iter()
        .filter(|r| r.is_requestable())
        .map(|r| format!("- @{}: {}", r.name, r.description.as_deref().unwrap_or_default()))
        .collect();
    if !requestable.is_empty() {
        sections.push(format!(
            "### Available Rules (mention @name to load)\n{}",
            requestable.join("\n")
        ));
    }

    if let Some(session) = session_context.filter(|s| !s.is_empty()) {
        sections.push(session.to_string());
    }

    debug!(sections = sections.len(), "Knowledge context built");
    if sections.is_empty() {
        return String::new();
    }
    format!("## Project Knowledge\n\n{}", sections.join("\n\n"))
}

/// Rule sections for every `@name` in `user_text`, ready to append to the
/// knowledge context.
pub fn rule_mentions(paths: &KeelPaths, user_text: &str) -> String {
    if !user_text.contains('@') {
        return String::new();
    }
    mentioned_rules(user_text, &load_rules(&paths.rules_dir()))
}
