//! On-disk layout of keel's project and global directories.

use keel_core::Scope;
use std::path::{Path, PathBuf};

/// Name of the per-project directory.
pub const PROJECT_DIR: &str = ".keel";

/// Resolves every file keel reads or writes.
///
/// Project files live under `<project>/.keel/`, global files under
/// `~/.keel/` (or whatever global root is supplied).
#[derive(Debug, Clone)]
pub struct KeelPaths {
    project_root: PathBuf,
    global_root: PathBuf,
}

impl KeelPaths {
    pub fn new(project_root: impl Into<PathBuf>, global_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            global_root: global_root.into(),
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// `<project>/.keel`
    pub fn project_dir(&self) -> PathBuf {
        self.project_root.join(PROJECT_DIR)
    }

    /// `~/.keel`
    pub fn global_dir(&self) -> &Path {
        &self.global_root
    }

    fn scope_dir(&self, scope: Scope) -> PathBuf {
        match scope {
            Scope::Project => self.project_dir(),
            Scope::Global => self.global_root.clone(),
        }
    }

    pub fn auto_memory(&self, scope: Scope) -> PathBuf {
        self.scope_dir(scope).join("memory").join("auto.md")
    }

    pub fn knowledge_file(&self, scope: Scope) -> PathBuf {
        self.scope_dir(scope).join("knowledge.md")
    }

    pub fn local_preferences(&self) -> PathBuf {
        self.project_dir().join("local").join("preferences.md")
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.project_dir().join("rules")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.project_dir().join("sessions")
    }

    pub fn plans_dir(&self) -> PathBuf {
        self.project_dir().join("plans")
    }
}
