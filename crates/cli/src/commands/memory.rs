//! `keel memory`: inspect and edit auto memory.

use anyhow::Context;
use clap::Subcommand;
use keel_config::AppConfig;
use keel_core::{Category, KnowledgeFact, Scope};
use keel_memory::KnowledgeStore;

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Show stored facts
    List {
        /// Use the global store instead of the project's
        #[arg(long)]
        global: bool,
    },

    /// Add a fact, replacing one with the same category and key
    Add {
        /// tech-stack, commands, conventions, preferences or context
        category: Category,
        key: String,
        fact: String,
        #[arg(long)]
        global: bool,
    },

    /// Delete facts by key
    Delete {
        key: String,
        /// Only delete in this category
        #[arg(long)]
        category: Option<Category>,
        #[arg(long)]
        global: bool,
    },

    /// Drop facts older than the configured age
    Evict {
        /// Override `agent.memory_max_age_days`
        #[arg(long)]
        days: Option<u32>,
        #[arg(long)]
        global: bool,
    },
}

fn open_store(global: bool) -> anyhow::Result<KnowledgeStore> {
    let paths = super::current_paths()?;
    let scope = if global { Scope::Global } else { Scope::Project };
    Ok(KnowledgeStore::open(paths.auto_memory(scope)))
}

pub async fn run(action: MemoryAction) -> anyhow::Result<()> {
    match action {
        MemoryAction::List { global } => {
            let store = open_store(global)?;
            println!("🧠 {}", store.path().display());
            println!();
            println!("{}", render_facts(&store.all().await));
        }
        MemoryAction::Add {
            category,
            key,
            fact,
            global,
        } => {
            let store = open_store(global)?;
            let fact = KnowledgeFact::new(category, key, fact);
            if fact.key.is_empty() || fact.fact.is_empty() {
                anyhow::bail!("Key and fact must not be blank");
            }
            println!("   ✅ Saved [{}] {}: {}", category.as_str(), fact.key, fact.fact);
            store.add(fact).await;
        }
        MemoryAction::Delete {
            key,
            category,
            global,
        } => {
            let store = open_store(global)?;
            match store.delete(&key, category).await {
                0 => println!("   No fact with key '{key}'"),
                n => println!("   ✅ Deleted {n} fact(s) with key '{key}'"),
            }
        }
        MemoryAction::Evict { days, global } => {
            let days = match days {
                Some(days) => days,
                None => {
                    AppConfig::load()
                        .context("Failed to load config")?
                        .agent
                        .memory_max_age_days
                }
            };
            let store = open_store(global)?;
            let removed = store.evict(days).await;
            println!("   ✅ Evicted {removed} fact(s) older than {days} days");
        }
    }
    Ok(())
}

/// Facts one per line, `[category] key: fact (date)`.
fn render_facts(facts: &[KnowledgeFact]) -> String {
    if facts.is_empty() {
        return "   No facts stored.".into();
    }
    facts
        .iter()
        .map(|f| format!("   [{}] {}: {} ({})", f.category.as_str(), f.key, f.fact, f.date))
        .collect::<Vec<_>>()
        .join("\n")
}
