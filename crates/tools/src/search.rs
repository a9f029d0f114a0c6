//! glob and grep over the working tree, honoring `.gitignore`.

use async_trait::async_trait;
use ignore::WalkBuilder;
use keel_core::error::ToolError;
use keel_core::tool::{Tool, ToolResult, names};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::resolve_path;

const MAX_GLOB_RESULTS: usize = 500;
const DEFAULT_GREP_RESULTS: usize = 50;

fn walk_files(root: &Path) -> impl Iterator<Item = PathBuf> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(false)
        .follow_links(false)
        .git_ignore(true)
        .require_git(false)
        .filter_entry(|e| e.file_name() != OsStr::new(".git"));
    builder
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(|entry| entry.into_path())
}

fn relative_display(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

pub struct GlobTool {
    root: PathBuf,
}

impl GlobTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        names::GLOB
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern. Returns sorted absolute file paths."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern (e.g. \"**/*.rs\", \"src/**/*.toml\")"
                },
                "cwd": {
                    "type": "string",
                    "description": "Directory to search in (defaults to working directory)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?;
        let compiled = glob::Pattern::new(pattern).map_err(|e| {
            ToolError::InvalidArguments(format!("invalid glob pattern '{pattern}': {e}"))
        })?;
        let base = match arguments["cwd"].as_str() {
            Some(cwd) => resolve_path(&self.root, cwd),
            None => self.root.clone(),
        };

        let mut matches: Vec<String> = tokio::task::spawn_blocking(move || {
            walk_files(&base)
                .filter(|p| compiled.matches(&relative_display(p, &base)))
                .map(|p| p.display().to_string())
                .collect()
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: names::GLOB.into(),
            reason: e.to_string(),
        })?;

        if matches.is_empty() {
            return Ok(ToolResult::ok("No files found matching the pattern."));
        }
        matches.sort();
        let total = matches.len();
        matches.truncate(MAX_GLOB_RESULTS);
        let mut output = matches.join("\n");
        if total > MAX_GLOB_RESULTS {
            output.push_str(&format!("\n... ({} more)", total - MAX_GLOB_RESULTS));
        }
        Ok(ToolResult::ok(output))
    }
}

pub struct GrepTool {
    root: PathBuf,
}

impl GrepTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        names::GREP
    }

    fn description(&self) -> &str {
        "Search file contents by regex pattern. Returns matching lines with file paths and line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "File or directory to search in (defaults to working directory)"
                },
                "glob": {
                    "type": "string",
                    "description": "Glob pattern to filter files (e.g. \"*.rs\")"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Max number of results (default: 50)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let pattern = arguments["pattern"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'pattern' argument".into()))?;
        let regex = regex::RegexBuilder::new(pattern)
            .build()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid regex '{pattern}': {e}")))?;
        let file_filter = arguments["glob"]
            .as_str()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| ToolError::InvalidArguments(format!("invalid glob: {e}")))?;
        let limit = arguments["max_results"]
            .as_u64()
            .map_or(DEFAULT_GREP_RESULTS, |n| n as usize);
        let target = match arguments["path"].as_str() {
            Some(p) => resolve_path(&self.root, p),
            None => self.root.clone(),
        };

        let lines = tokio::task::spawn_blocking(move || {
            let mut lines = Vec::new();
            for file in walk_files(&target) {
                if let Some(filter) = &file_filter {
                    let name = file.file_name().map(|n| n.to_string_lossy().into_owned());
                    let rel = relative_display(&file, &target);
                    if !filter.matches(&rel) && !name.is_some_and(|n| filter.matches(&n)) {
                        continue;
                    }
                }
                // binary and non-UTF-8 files are skipped
                let Ok(content) = std::fs::read_to_string(&file) else {
                    continue;
                };
                for (idx, line) in content.lines().enumerate() {
                    if regex.is_match(line) {
                        lines.push(format!("{}:{}:{line}", file.display(), idx + 1));
                        if lines.len() >= limit {
                            return lines;
                        }
                    }
                }
            }
            lines
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: names::GREP.into(),
            reason: e.to_string(),
        })?;

        if lines.is_empty() {
            return Ok(ToolResult::ok("No matches found."));
        }
        Ok(ToolResult::ok(lines.join("\n")))
    }
}
