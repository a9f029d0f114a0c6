//! Auto memory: key-addressed fact stores persisted as markdown.
//!
//! Each scope has one file, grouped by category:
//!
//! ```text
//! ## Auto Memory
//!
//! ### tech-stack
//! - [2026-03-01] package-manager: cargo
//!
//! ```
//!
//! Facts are loaded into memory on creation and flushed to disk on every
//! mutation. A failed flush is logged and otherwise ignored.

use chrono::{Days, NaiveDate, Utc};
use keel_core::error::MemoryError;
use keel_core::{Category, KnowledgeFact, Scope, normalize_key};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::paths::KeelPaths;

/// Lines of serialized memory injected into the system prompt.
pub const MAX_PROMPT_LINES: usize = 200;

static CATEGORY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^### (.+)$").expect("category pattern is valid"));

static FACT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^- \[(\d{4}-\d{2}-\d{2})\] (.+?):\s*(.+)$").expect("fact pattern is valid")
});

/// One scope's fact store.
pub struct KnowledgeStore {
    path: PathBuf,
    facts: Arc<RwLock<Vec<KnowledgeFact>>>,
}

impl KnowledgeStore {
    /// Open the store at `path`, loading any facts already on disk.
    ///
    /// A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let facts = Self::load_from_disk(&path);
        debug!(path = %path.display(), count = facts.len(), "Auto memory loaded");
        Self {
            path,
            facts: Arc::new(RwLock::new(facts)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Vec<KnowledgeFact> {
        match std::fs::read_to_string(path) {
            Ok(content) => parse_memory(&content),
            Err(_) => Vec::new(),
        }
    }

    /// Add a fact, replacing any fact with the same category and key in place.
    pub async fn add(&self, fact: KnowledgeFact) {
        {
            let mut facts = self.facts.write().await;
            match facts
                .iter_mut()
                .find(|f| f.category == fact.category && f.key == fact.key)
            {
                Some(existing) => *existing = fact,
                None => facts.push(fact),
            }
        }
        self.persist().await;
    }

    /// Remove every fact with `key` (restricted to `category` if given).
    /// Returns how many were removed.
    pub async fn delete(&self, key: &str, category: Option<Category>) -> usize {
        let key = normalize_key(key);
        let removed = {
            let mut facts = self.facts.write().await;
            let before = facts.len();
            facts.retain(|f| !(f.key == key && category.is_none_or(|c| f.category == c)));
            before - facts.len()
        };
        self.persist().await;
        removed
    }

    /// First fact with `key` (and `category` if given).
    pub async fn find(&self, key: &str, category: Option<Category>) -> Option<KnowledgeFact> {
        let key = normalize_key(key);
        self.facts
            .read()
            .await
            .iter()
            .find(|f| f.key == key && category.is_none_or(|c| f.category == c))
            .cloned()
    }

    /// Drop facts dated on or before `today - max_age_days`.
    /// Persists only when something was removed.
    pub async fn evict(&self, max_age_days: u32) -> usize {
        let today = Utc::now().date_naive();
        let cutoff = today
            .checked_sub_days(Days::new(u64::from(max_age_days)))
            .unwrap_or(NaiveDate::MIN);
        let removed = {
            let mut facts = self.facts.write().await;
            let before = facts.len();
            facts.retain(|f| f.date > cutoff);
            before - facts.len()
        };
        if removed > 0 {
            debug!(path = %self.path.display(), removed, "Evicted stale facts");
            self.persist().await;
        }
        removed
    }

    /// All facts in storage order.
    pub async fn all(&self) -> Vec<KnowledgeFact> {
        self.facts.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.facts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Serialized facts for the system prompt, capped at [`MAX_PROMPT_LINES`].
    pub async fn prompt_content(&self) -> String {
        let content = serialize_memory(&self.facts.read().await);
        let lines: Vec<&str> = content.split('\n').collect();
        if lines.len() > MAX_PROMPT_LINES {
            format!("{}\n... (truncated)", lines[..MAX_PROMPT_LINES].join("\n"))
        } else {
            content
        }
    }

    async fn persist(&self) {
        if let Err(e) = self.flush().await {
            warn!(path = %self.path.display(), error = %e, "Failed to persist auto memory");
        }
    }

    /// Write all facts to disk.
    async fn flush(&self) -> Result<(), MemoryError> {
        let content = serialize_memory(&self.facts.read().await);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MemoryError::Storage(format!("Failed to create memory directory: {e}"))
            })?;
        }

        std::fs::write(&self.path, content)
            .map_err(|e| MemoryError::Storage(format!("Failed to write memory file: {e}")))
    }
}

/// The project and global stores, passed explicitly to whoever needs them.
pub struct KnowledgeStores {
    pub project: KnowledgeStore,
    pub global: KnowledgeStore,
}

impl KnowledgeStores {
    /// Open both scopes and evict facts older than `max_age_days`.
    pub async fn init(paths: &KeelPaths, max_age_days: u32) -> Self {
        let stores = Self {
            project: KnowledgeStore::open(paths.auto_memory(Scope::Project)),
            global: KnowledgeStore::open(paths.auto_memory(Scope::Global)),
        };
        stores.project.evict(max_age_days).await;
        stores.global.evict(max_age_days).await;
        stores
    }

    pub fn scope(&self, scope: Scope) -> &KnowledgeStore {
        match scope {
            Scope::Project => &self.project,
            Scope::Global => &self.global,
        }
    }
}

/// Render facts grouped by category, categories in first-seen order.
pub fn serialize_memory(facts: &[KnowledgeFact]) -> String {
    if facts.is_empty() {
        return String::new();
    }

    let mut order: Vec<Category> = Vec::new();
    for fact in facts {
        if !order.contains(&fact.category) {
            order.push(fact.category);
        }
    }

    let mut lines = vec!["## Auto Memory".to_string(), String::new()];
    for category in order {
        lines.push(format!("### {category}"));
        for f in facts.iter().filter(|f| f.category == category) {
            lines.push(format!("- [{}] {}: {}", f.date.format("%Y-%m-%d"), f.key, f.fact));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Parse a memory file. Unknown categories and malformed lines are skipped.
pub fn parse_memory(content: &str) -> Vec<KnowledgeFact> {
    let mut facts = Vec::new();
    let mut current: Option<Category> = None;

    for line in content.lines() {
        if let Some(caps) = CATEGORY_LINE.captures(line) {
            current = match caps[1].trim().parse::<Category>() {
                Ok(category) => Some(category),
                Err(e) => {
                    warn!(error = %e, "Skipping unknown memory category");
                    None
                }
            };
            continue;
        }

        let (Some(category), Some(caps)) = (current, FACT_LINE.captures(line)) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d") else {
            warn!(line, "Skipping memory fact with invalid date");
            continue;
        };
        facts.push(KnowledgeFact {
            key: caps[2].trim().to_string(),
            fact: caps[3].trim().to_string(),
            category,
            date,
        });
    }

    facts
}
