pub mod chat;
pub mod config_cmd;
pub mod memory;
pub mod plans;
pub mod session;
pub mod slash;
pub mod terminal;

use anyhow::Context;
use keel_config::AppConfig;
use keel_memory::KeelPaths;

/// Paths for the current directory's project and the global `~/.keel`.
pub fn current_paths() -> anyhow::Result<KeelPaths> {
    let cwd = std::env::current_dir().context("Failed to read the current directory")?;
    Ok(KeelPaths::new(cwd, AppConfig::config_dir()))
}
