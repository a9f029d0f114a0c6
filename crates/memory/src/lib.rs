//! Persistent memory for keel.
//!
//! - [`auto_memory`]: key-addressed fact stores (project and global scope)
//! - [`loader`]: the knowledge context injected into the system prompt
//! - [`rules`]: `.keel/rules/*.md` rule files
//! - [`scan`]: the startup project scan
//! - [`session`]: end-of-session summaries for continuation
//!
//! Every write here is best-effort: failures are logged and never reach
//! the conversation.

pub mod auto_memory;
pub mod loader;
pub mod paths;
pub mod rules;
pub mod scan;
pub mod session;

pub use auto_memory::{KnowledgeStore, KnowledgeStores};
pub use loader::{load_knowledge_context, rule_mentions};
pub use paths::KeelPaths;
pub use rules::{RuleFile, load_rules};
pub use scan::scan_project;
pub use session::{SessionStore, format_session_for_prompt, generate_summary};
