//! Rule files under `.keel/rules/*.md`.
//!
//! A rule is markdown with optional front-matter:
//!
//! ```text
//! ---
//! alwaysApply: false
//! description: "Conventions for the parser crate"
//! paths: ["crates/parser/**", "*.pest"]
//! ---
//! Body...
//! ```
//!
//! Rules load in one of four ways: always, by active-file path match, on
//! `@name` mention, or not at all (listed by description only).

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static FRONTMATTER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^---\n(.*?)\n---\n(.*)$").expect("front-matter pattern is valid")
});

static FRONTMATTER_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+):\s*(.+)$").expect("key pattern is valid"));

static MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([\w-]+)").expect("mention pattern is valid"));

/// A parsed rule file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFile {
    /// File stem, used for `@name` mentions
    pub name: String,
    pub always_apply: bool,
    /// Globs matched against active file paths
    pub paths: Vec<String>,
    pub description: Option<String>,
    pub body: String,
}

impl RuleFile {
    /// Parse a rule from its file stem and raw content.
    pub fn parse(name: impl Into<String>, content: &str) -> Self {
        let mut rule = RuleFile {
            name: name.into(),
            ..Default::default()
        };

        let Some(caps) = FRONTMATTER.captures(content) else {
            rule.body = content.to_string();
            return rule;
        };

        for line in caps[1].lines() {
            let Some(kv) = FRONTMATTER_KEY.captures(line) else {
                continue;
            };
            let value = kv[2].trim();
            match &kv[1] {
                "alwaysApply" => rule.always_apply = value == "true",
                "description" => rule.description = Some(unquote(value).to_string()),
                "paths" => rule.paths = parse_list(value),
                _ => {}
            }
        }
        rule.body = caps[2].to_string();
        rule
    }

    /// Whether any active file falls under this rule's `paths` globs.
    ///
    /// Absolute paths are made relative to `project_root` first.
    pub fn matches_any(&self, project_root: &Path, active_files: &[PathBuf]) -> bool {
        let patterns: Vec<glob::Pattern> = self
            .paths
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(rule = %self.name, pattern = %p, error = %e, "Invalid rule path glob");
                    None
                }
            })
            .collect();

        active_files.iter().any(|file| {
            let relative = file.strip_prefix(project_root).unwrap_or(file);
            patterns.iter().any(|p| p.matches_path(relative))
        })
    }

    /// Listed in the prompt so the model (or user) can ask for it by name.
    pub fn is_requestable(&self) -> bool {
        self.description.is_some() && !self.always_apply
    }

    /// `### Rule: {name}` section text.
    pub fn section(&self) -> String {
        format!("### Rule: {}\n{}", self.name, self.body)
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// `["a", "b"]` into its items.
fn parse_list(value: &str) -> Vec<String> {
    let Some(inner) = value
        .find('[')
        .and_then(|start| value.rfind(']').map(|end| (start, end)))
        .filter(|(start, end)| start < end)
        .map(|(start, end)| &value[start + 1..end])
    else {
        return Vec::new();
    };
    inner
        .split(',')
        .map(|p| unquote(p.trim()).to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Load every `*.md` rule in `dir`, sorted by name. A missing directory is empty.
pub fn load_rules(dir: &Path) -> Vec<RuleFile> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut rules: Vec<RuleFile> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "md"))
        .filter_map(|p| {
            let name = p.file_stem()?.to_string_lossy().into_owned();
            match std::fs::read_to_string(&p) {
                Ok(content) => Some(RuleFile::parse(name, &content)),
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "Failed to read rule file");
                    None
                }
            }
        })
        .collect();

    rules.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(dir = %dir.display(), count = rules.len(), "Rules loaded");
    rules
}

/// Sections for every rule mentioned as `@name` in `text`, in mention order.
pub fn mentioned_rules(text: &str, rules: &[RuleFile]) -> String {
    let mut seen: Vec<&str> = Vec::new();
    let mut out = String::new();
    for caps in MENTION.captures_iter(text) {
        let name = caps.get(1).map_or("", |m| m.as_str());
        if seen.contains(&name) {
            continue;
        }
        if let Some(rule) = rules.iter().find(|r| r.name == name) {
            seen.push(name);
            out.push_str("\n\n");
            out.push_str(&rule.section());
        }
    }
    out
}
