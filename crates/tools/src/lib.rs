//! Built-in tool implementations for keel.
//!
//! Tools give the agent the ability to act on the local machine: read and
//! search files, fetch web pages, remember facts, write and edit files, and
//! run shell commands.
//!
//! Read-only tools implement [`Tool`](keel_core::Tool) and are executed by
//! the model client. The permission-gated tools run through
//! [`GatedExecutor`] once the agent loop has approved the call.

pub mod gated;
pub mod interactive;
pub mod list_dir;
pub mod read_file;
pub mod save_knowledge;
pub mod search;
pub mod shell;
pub mod web_fetch;
pub mod web_search;
pub mod write_file;

use keel_core::tool::{ControlTool, GatedTool, InteractiveTool, ToolCatalog, ToolKind};
use keel_memory::KnowledgeStores;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use gated::{GatedExecutor, GatedOutcome};
pub use interactive::{QuestionOption, parse_question};
pub use shell::{ShellRunner, shell_program};

/// Resolve `path` against `root` unless it is already absolute.
pub fn resolve_path(root: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// The full catalog for a session rooted at `root`.
pub fn default_catalog(root: &Path, stores: Arc<KnowledgeStores>) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();

    catalog.register_auto(Arc::new(read_file::ReadFileTool::new(root)));
    catalog.register_auto(Arc::new(list_dir::ListDirTool::new(root)));
    catalog.register_auto(Arc::new(search::GlobTool::new(root)));
    catalog.register_auto(Arc::new(search::GrepTool::new(root)));
    catalog.register_auto(Arc::new(web_fetch::WebFetchTool::new()));
    catalog.register_auto(Arc::new(web_search::WebSearchTool::from_env()));
    catalog.register_auto(Arc::new(save_knowledge::SaveKnowledgeTool::new(stores)));

    catalog.register_manual(
        write_file::write_file_definition(),
        ToolKind::PermissionGated(GatedTool::WriteFile),
    );
    catalog.register_manual(
        write_file::edit_definition(),
        ToolKind::PermissionGated(GatedTool::Edit),
    );
    catalog.register_manual(
        shell::shell_definition(),
        ToolKind::PermissionGated(GatedTool::Shell),
    );
    catalog.register_manual(
        interactive::ask_user_definition(),
        ToolKind::Interactive(InteractiveTool::AskUser),
    );
    catalog.register_manual(
        interactive::enter_plan_mode_definition(),
        ToolKind::Control(ControlTool::EnterPlanMode),
    );
    catalog.register_manual(
        interactive::exit_plan_mode_definition(),
        ToolKind::Control(ControlTool::ExitPlanMode),
    );

    catalog
}
