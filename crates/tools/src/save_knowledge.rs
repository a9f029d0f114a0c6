//! save_knowledge: lets the model add or delete auto memory facts.

use async_trait::async_trait;
use keel_core::error::ToolError;
use keel_core::tool::{Tool, ToolResult, names};
use keel_core::{Category, KnowledgeFact, Scope, normalize_key};
use keel_memory::KnowledgeStores;
use std::sync::Arc;

/// Writes to the project or global store chosen by the call.
pub struct SaveKnowledgeTool {
    stores: Arc<KnowledgeStores>,
}

impl SaveKnowledgeTool {
    pub fn new(stores: Arc<KnowledgeStores>) -> Self {
        Self { stores }
    }
}

fn required<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

#[async_trait]
impl Tool for SaveKnowledgeTool {
    fn name(&self) -> &str {
        names::SAVE_KNOWLEDGE
    }

    fn description(&self) -> &str {
        "Save, update, or delete a project/user knowledge fact in persistent memory. \
         Use when you discover project conventions, user preferences, or important facts \
         worth remembering for future sessions."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["add", "delete"],
                    "description": "add = create or update (replaces the old fact with the same key), delete = remove an outdated fact"
                },
                "key": {
                    "type": "string",
                    "description": "Short unique identifier, e.g. \"package-manager\". Same key = same fact."
                },
                "fact": {
                    "type": "string",
                    "description": "The fact value, e.g. \"cargo (workspace)\""
                },
                "scope": {
                    "type": "string",
                    "enum": ["project", "global"],
                    "description": "project = this repo (.keel/), global = all repos (~/.keel/)"
                },
                "category": {
                    "type": "string",
                    "enum": ["tech-stack", "commands", "conventions", "preferences", "context"]
                }
            },
            "required": ["action", "key", "scope", "category"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let action = required(&arguments, "action")?;
        let key = required(&arguments, "key")?;
        let scope: Scope = required(&arguments, "scope")?
            .parse()
            .map_err(ToolError::InvalidArguments)?;
        let category: Category = required(&arguments, "category")?
            .parse()
            .map_err(ToolError::InvalidArguments)?;
        let store = self.stores.scope(scope);

        match action {
            "add" => {
                let fact = KnowledgeFact::new(category, key, required(&arguments, "fact")?);
                if fact.key.is_empty() || fact.fact.is_empty() {
                    return Err(ToolError::InvalidArguments(
                        "'key' and 'fact' must not be blank".into(),
                    ));
                }
                let saved = format!("Knowledge saved: [{category}] {}: {}", fact.key, fact.fact);
                store.add(fact).await;
                Ok(ToolResult::ok(saved))
            }
            "delete" => {
                let key = normalize_key(key);
                store.delete(&key, Some(category)).await;
                Ok(ToolResult::ok(format!("Knowledge deleted: [{category}] {key}")))
            }
            other => Err(ToolError::InvalidArguments(format!(
                "unknown action '{other}', expected add or delete"
            ))),
        }
    }
}
