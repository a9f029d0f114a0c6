//! Executors for the permission-gated tools.
//!
//! The agent loop only reaches these after the gate approved the call.

use keel_core::error::ToolError;
use keel_core::message::ToolCall;
use keel_core::tool::GatedTool;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::shell::ShellRunner;
use crate::write_file::{edit_file, write_file};

/// Result text of a gated tool plus the file it changed, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatedOutcome {
    pub text: String,
    pub modified: Option<PathBuf>,
}

impl GatedOutcome {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            modified: None,
        }
    }

    pub fn modified(text: impl Into<String>, path: PathBuf) -> Self {
        Self {
            text: text.into(),
            modified: Some(path),
        }
    }
}

/// Runs write_file, edit and shell against one project root.
#[derive(Debug, Clone)]
pub struct GatedExecutor {
    root: PathBuf,
    shell: ShellRunner,
}

impl GatedExecutor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            shell: ShellRunner::new(root.clone()),
            root,
        }
    }

    pub fn with_shell_timeout(mut self, timeout_ms: u64) -> Self {
        self.shell = self.shell.with_default_timeout(timeout_ms);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn execute(
        &self,
        tool: GatedTool,
        call: &ToolCall,
        cancel: &CancellationToken,
        on_shell_output: &mut (dyn FnMut(&str) + Send),
    ) -> Result<GatedOutcome, ToolError> {
        match tool {
            GatedTool::WriteFile => write_file(&self.root, &call.input).await,
            GatedTool::Edit => edit_file(&self.root, &call.input).await,
            GatedTool::Shell => self
                .shell
                .run(&call.input, cancel, on_shell_output)
                .await
                .map(GatedOutcome::text),
        }
    }
}
