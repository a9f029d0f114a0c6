//! list_dir: directory entries, `/` suffix on directories.

use async_trait::async_trait;
use keel_core::error::ToolError;
use keel_core::tool::{Tool, ToolResult, names};
use std::path::PathBuf;

use crate::resolve_path;

pub struct ListDirTool {
    root: PathBuf,
}

impl ListDirTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        names::LIST_DIR
    }

    fn description(&self) -> &str {
        "List the contents of a directory. Returns names with type indicators (/ for directories)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dir_path": {
                    "type": "string",
                    "description": "Absolute path to the directory"
                }
            },
            "required": ["dir_path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let dir = arguments["dir_path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'dir_path' argument".into()))?;
        let dir = resolve_path(&self.root, dir);

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => return Ok(ToolResult::failed(format!("Error listing directory: {e}"))),
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
                    let name = entry.file_name().to_string_lossy().into_owned();
                    names.push(if is_dir { format!("{name}/") } else { name });
                }
                Ok(None) => break,
                Err(e) => return Ok(ToolResult::failed(format!("Error listing directory: {e}"))),
            }
        }
        names.sort();

        if names.is_empty() {
            return Ok(ToolResult::ok("(empty directory)"));
        }
        Ok(ToolResult::ok(names.join("\n")))
    }
}
