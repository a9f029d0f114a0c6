//! Knowledge fact types for the auto memory stores.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which store a fact lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// `<project>/.keel/memory/auto.md`
    Project,
    /// `~/.keel/memory/auto.md`
    Global,
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "project" => Ok(Scope::Project),
            "global" => Ok(Scope::Global),
            other => Err(format!("unknown scope '{other}'")),
        }
    }
}

/// Fact category, rendered as a subheading in the memory file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    TechStack,
    Commands,
    Conventions,
    Preferences,
    Context,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::TechStack,
        Category::Commands,
        Category::Conventions,
        Category::Preferences,
        Category::Context,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TechStack => "tech-stack",
            Category::Commands => "commands",
            Category::Conventions => "conventions",
            Category::Preferences => "preferences",
            Category::Context => "context",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// A single remembered fact. At most one per (scope, category, key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeFact {
    pub key: String,
    pub fact: String,
    pub category: Category,
    pub date: NaiveDate,
}

impl KnowledgeFact {
    /// A fact dated today (UTC). Key and fact are normalized so the fact
    /// survives a round trip through the memory file.
    pub fn new(category: Category, key: impl AsRef<str>, fact: impl AsRef<str>) -> Self {
        Self {
            key: normalize_key(key.as_ref()),
            fact: single_line(fact.as_ref()),
            category,
            date: chrono::Utc::now().date_naive(),
        }
    }
}

/// A key as stored: one line, no `:` (it separates key from fact on disk).
pub fn normalize_key(key: &str) -> String {
    single_line(key).replace(':', "-")
}

/// Collapse line breaks and whitespace runs to single spaces.
fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
