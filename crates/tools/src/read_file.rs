//! read_file: file contents with line numbers.

use async_trait::async_trait;
use keel_core::error::ToolError;
use keel_core::tool::{Tool, ToolResult, names};

use crate::resolve_path;
use std::path::PathBuf;

pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    /// Relative paths resolve against `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        names::READ_FILE
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the given path. Returns the file content with line numbers."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "Start line (1-based)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Max lines to read"
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["file_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'file_path' argument".into()))?;
        let offset = arguments["offset"].as_u64().unwrap_or(1).max(1) as usize;
        let limit = arguments["limit"].as_u64().map(|l| l as usize);

        let path = resolve_path(&self.root, path);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::ok(number_lines(&content, offset, limit))),
            Err(e) => Ok(ToolResult::failed(format!("Error reading file: {e}"))),
        }
    }
}

fn number_lines(content: &str, offset: usize, limit: Option<usize>) -> String {
    content
        .split('\n')
        .enumerate()
        .skip(offset - 1)
        .take(limit.unwrap_or(usize::MAX))
        .map(|(i, line)| format!("{}\t{line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
