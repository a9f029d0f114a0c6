//! Security module for keel: the permission gate and its audit trail.
//!
//! Provides:
//! - **Shell classification**: compound command splitting, destructive and read-only patterns
//! - **Permission gate**: three-tier `classify` and the async `check_permission`
//! - **Audit logging**: structured record of every gate outcome

pub mod audit;
pub mod permission;
pub mod shell;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use permission::{PermissionDecision, check_permission, classify};
pub use shell::{is_destructive, is_read_only, split_shell_commands};
