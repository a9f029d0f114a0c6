//! write_file and edit: the file mutators behind the permission gate.

use keel_core::error::ToolError;
use keel_core::tool::{ToolDefinition, names};
use std::path::Path;

use crate::gated::GatedOutcome;
use crate::resolve_path;

fn required<'a>(input: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    input[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

fn io_error(tool: &str, e: std::io::Error) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason: e.to_string(),
    }
}

pub fn write_file_definition() -> ToolDefinition {
    ToolDefinition {
        name: names::WRITE_FILE.into(),
        description: "Create or overwrite a file at the given path. Always prefer edit (string \
                      replacement) over write_file for modifying existing files."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file"
                },
                "content": {
                    "type": "string",
                    "description": "The full content to write"
                }
            },
            "required": ["file_path", "content"]
        }),
    }
}

pub fn edit_definition() -> ToolDefinition {
    ToolDefinition {
        name: names::EDIT.into(),
        description: "Replace a specific string in a file. The old_string must be unique in the \
                      file. Preferred over write_file for modifications."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Absolute path to the file"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to find and replace (must be unique in the file)"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace all occurrences (default: false)"
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        }),
    }
}

/// Write `content` to `file_path`, creating parent directories.
pub async fn write_file(root: &Path, input: &serde_json::Value) -> Result<GatedOutcome, ToolError> {
    let path = resolve_path(root, required(input, "file_path")?);
    let content = required(input, "content")?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(names::WRITE_FILE, e))?;
    }
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| io_error(names::WRITE_FILE, e))?;

    Ok(GatedOutcome::modified(
        format!(
            "File written: {} ({} characters)",
            path.display(),
            content.chars().count()
        ),
        path,
    ))
}

/// Replace `old_string` with `new_string` in `file_path`.
///
/// Without `replace_all` the match must be unique; a missing or ambiguous
/// match is reported as text and leaves the file untouched.
pub async fn edit_file(root: &Path, input: &serde_json::Value) -> Result<GatedOutcome, ToolError> {
    let path = resolve_path(root, required(input, "file_path")?);
    let old = required(input, "old_string")?;
    let new = required(input, "new_string")?;
    let replace_all = input["replace_all"].as_bool().unwrap_or(false);

    if old.is_empty() {
        return Err(ToolError::InvalidArguments("old_string must not be empty".into()));
    }

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| io_error(names::EDIT, e))?;

    let count = content.matches(old).count();
    if count == 0 {
        return Ok(GatedOutcome::text(format!(
            "Error: old_string not found in {}",
            path.display()
        )));
    }
    if count > 1 && !replace_all {
        return Ok(GatedOutcome::text(format!(
            "Error: old_string is not unique in {} (found {count} occurrences). \
             Provide more context or set replace_all: true.",
            path.display()
        )));
    }

    let updated = if replace_all {
        content.replace(old, new)
    } else {
        content.replacen(old, new, 1)
    };
    tokio::fs::write(&path, updated)
        .await
        .map_err(|e| io_error(names::EDIT, e))?;

    Ok(GatedOutcome::modified(format!("File edited: {}", path.display()), path))
}
