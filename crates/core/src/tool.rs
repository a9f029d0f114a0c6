//! Tool trait and catalog: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act on the local machine:
//! read and write files, run shell commands, search, fetch web pages.
//!
//! Every catalog entry carries a [`ToolKind`]. Only `AutoExecuted` tools run
//! inside the model client; the other kinds are handled by the agent loop,
//! which matches on them exhaustively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::message::ToolCall;

/// Max characters for tool results before truncation.
pub const MAX_TOOL_RESULT_CHARS: usize = 30_000;

/// Canonical tool names.
pub mod names {
    pub const READ_FILE: &str = "read_file";
    pub const WRITE_FILE: &str = "write_file";
    pub const EDIT: &str = "edit";
    pub const SHELL: &str = "shell";
    pub const GLOB: &str = "glob";
    pub const GREP: &str = "grep";
    pub const LIST_DIR: &str = "list_dir";
    pub const WEB_SEARCH: &str = "web_search";
    pub const WEB_FETCH: &str = "web_fetch";
    pub const ASK_USER: &str = "ask_user";
    pub const SAVE_KNOWLEDGE: &str = "save_knowledge";
    pub const ENTER_PLAN_MODE: &str = "enter_plan_mode";
    pub const EXIT_PLAN_MODE: &str = "exit_plan_mode";
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content
    pub output: String,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// The core Tool trait, implemented by every auto-executed tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Tools that touch the machine and must pass the permission gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedTool {
    WriteFile,
    Edit,
    Shell,
}

/// Tools that flip plan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTool {
    EnterPlanMode,
    ExitPlanMode,
}

/// Tools that suspend the loop for a human answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveTool {
    AskUser,
}

/// How a catalog entry is dispatched.
#[derive(Clone)]
pub enum ToolKind {
    /// Executed by the model client as soon as the model calls it.
    AutoExecuted(Arc<dyn Tool>),
    /// Executed by the agent loop after the permission gate.
    PermissionGated(GatedTool),
    /// Mutates plan mode state.
    Control(ControlTool),
    /// Pauses for an external answer.
    Interactive(InteractiveTool),
}

impl std::fmt::Debug for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolKind::AutoExecuted(tool) => write!(f, "AutoExecuted({})", tool.name()),
            ToolKind::PermissionGated(t) => write!(f, "PermissionGated({t:?})"),
            ToolKind::Control(t) => write!(f, "Control({t:?})"),
            ToolKind::Interactive(t) => write!(f, "Interactive({t:?})"),
        }
    }
}

/// One entry in the catalog.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub definition: ToolDefinition,
    pub kind: ToolKind,
}

/// The static map of tool name to definition and dispatch kind.
///
/// The agent loop uses this to:
/// 1. Send tool definitions to the model
/// 2. Decide how each requested call is dispatched
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an auto-executed tool. Replaces any existing entry with the same name.
    pub fn register_auto(&mut self, tool: Arc<dyn Tool>) {
        let definition = tool.to_definition();
        self.entries.insert(
            definition.name.clone(),
            CatalogEntry {
                definition,
                kind: ToolKind::AutoExecuted(tool),
            },
        );
    }

    /// Register a tool the loop handles itself.
    pub fn register_manual(&mut self, definition: ToolDefinition, kind: ToolKind) {
        self.entries
            .insert(definition.name.clone(), CatalogEntry { definition, kind });
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    /// Dispatch kind for a tool name.
    pub fn kind(&self, name: &str) -> Option<&ToolKind> {
        self.entries.get(name).map(|e| &e.kind)
    }

    pub fn is_auto_executed(&self, name: &str) -> bool {
        matches!(self.kind(name), Some(ToolKind::AutoExecuted(_)))
    }

    /// All tool definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.entries.values().map(|e| e.definition.clone()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Run an auto-executed tool and return its full result text.
    ///
    /// Returns `None` when the call does not name an auto-executed tool.
    /// Execution failures become `Error: ...` text.
    pub async fn execute_auto(&self, call: &ToolCall) -> Option<String> {
        let ToolKind::AutoExecuted(tool) = self.kind(&call.name)? else {
            return None;
        };
        debug!(tool = %call.name, call_id = %call.id, "Auto-executing tool");
        let text = match tool.execute(call.input.clone()).await {
            Ok(result) => result.output,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                format!("Error: {e}")
            }
        };
        Some(text)
    }
}

/// Truncate a tool result, keeping head and tail halves.
pub fn truncate_tool_result(result: &str) -> String {
    truncate_with_limit(result, MAX_TOOL_RESULT_CHARS)
}

fn truncate_with_limit(result: &str, max_chars: usize) -> String {
    let total = result.chars().count();
    if total <= max_chars {
        return result.to_string();
    }
    let half = max_chars / 2;
    let head_end = byte_offset(result, half);
    let tail_start = byte_offset(result, total - half);
    let truncated_lines = result[head_end..tail_start].split('\n').count();
    format!(
        "{}\n\n... [truncated {truncated_lines} lines] ...\n\n{}",
        &result[..head_end],
        &result[tail_start..]
    )
}

fn byte_offset(s: &str, char_index: usize) -> usize {
    s.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}
