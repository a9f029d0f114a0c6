//! Plan mode: a two-state switch that asks the model to stick to
//! read-only tools while it drafts a plan file.
//!
//! Restrictions are only requested through the system prompt; the
//! permission gate does not enforce them.

use chrono::{DateTime, Utc};
use keel_core::state::ConversationState;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Plan id for `now`: `YYYY-MM-DDTHH-MM-SS`.
pub fn generate_plan_id(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

pub fn plan_path(plans_dir: &Path, plan_id: &str) -> PathBuf {
    plans_dir.join(format!("{plan_id}.md"))
}

/// System prompt overlay while plan mode is active.
pub fn plan_mode_prompt(plan_file: &Path) -> String {
    format!(
        "Plan mode is active. You MUST NOT make any edits to project code, execute write commands, \
         or make any changes to user files.\n\
         Only use read-only tools: read_file, glob, grep, list_dir, web_search, web_fetch.\n\
         The ONLY exception: use write_file to save your plan to {}.\n\
         When the plan is ready, call exit_plan_mode.",
        plan_file.display()
    )
}

/// Activate plan mode with a fresh plan id and return the tool result.
pub async fn enter_plan_mode(
    state: &mut ConversationState,
    plans_dir: &Path,
    now: DateTime<Utc>,
) -> String {
    let plan_id = generate_plan_id(now);
    if let Err(e) = tokio::fs::create_dir_all(plans_dir).await {
        warn!(path = %plans_dir.display(), error = %e, "Failed to create plans directory");
    }
    let path = plan_path(plans_dir, &plan_id);
    info!(plan_id = %plan_id, "Plan mode activated");

    state.plan_mode = true;
    state.plan_id = Some(plan_id.clone());
    format!(
        "Plan mode activated. Plan ID: {plan_id}. Use only read-only tools. Save plan to {}",
        path.display()
    )
}

/// Leave plan mode and return the plan for review.
///
/// The plan id stays on the state so the CLI can still point at it.
pub async fn exit_plan_mode(state: &mut ConversationState, plans_dir: &Path) -> String {
    state.plan_mode = false;
    let Some(plan_id) = state.plan_id.as_deref() else {
        return "Plan mode exited.".into();
    };

    match tokio::fs::read_to_string(plan_path(plans_dir, plan_id)).await {
        Ok(content) => {
            info!(plan_id = %plan_id, "Plan ready for review");
            format!("Plan ready for review:\n\n{content}")
        }
        Err(e) => {
            debug!(plan_id = %plan_id, error = %e, "No plan file on exit");
            "Plan mode exited. No plan file found.".into()
        }
    }
}

/// Ids of saved plans, newest first.
pub fn list_plans(plans_dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(plans_dir) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            name.strip_suffix(".md").map(str::to_string)
        })
        .collect();
    // Ids are timestamps, so lexical order is chronological.
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids
}

pub fn read_plan(plans_dir: &Path, plan_id: &str) -> Option<String> {
    std::fs::read_to_string(plan_path(plans_dir, plan_id)).ok()
}
