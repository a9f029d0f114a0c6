//! Definitions for tools the agent loop answers itself: ask_user and the
//! plan mode switches. They have no executor here.

use keel_core::tool::{ToolDefinition, names};
use serde::{Deserialize, Serialize};

pub fn ask_user_definition() -> ToolDefinition {
    ToolDefinition {
        name: names::ASK_USER.into(),
        description: "Ask the user a clarifying question with multiple-choice options. Use when \
                      you need user input to decide between approaches."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "The question to ask"
                },
                "options": {
                    "type": "array",
                    "minItems": 2,
                    "maxItems": 4,
                    "description": "Choices (the user may also answer freely)",
                    "items": {
                        "type": "object",
                        "properties": {
                            "label": { "type": "string", "description": "Option label (1-5 words)" },
                            "description": { "type": "string", "description": "What this option means" }
                        },
                        "required": ["label", "description"]
                    }
                }
            },
            "required": ["question", "options"]
        }),
    }
}

pub fn enter_plan_mode_definition() -> ToolDefinition {
    ToolDefinition {
        name: names::ENTER_PLAN_MODE.into(),
        description: "Enter plan mode for complex tasks. In plan mode, only read-only tools are \
                      allowed. Write your plan to the plan file, then call exit_plan_mode."
            .into(),
        parameters: serde_json::json!({ "type": "object", "properties": {} }),
    }
}

pub fn exit_plan_mode_definition() -> ToolDefinition {
    ToolDefinition {
        name: names::EXIT_PLAN_MODE.into(),
        description: "Exit plan mode and present the plan for user review.".into(),
        parameters: serde_json::json!({ "type": "object", "properties": {} }),
    }
}

/// One choice offered by `ask_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// Question text and options from an `ask_user` call. Malformed options are dropped.
pub fn parse_question(input: &serde_json::Value) -> (String, Vec<QuestionOption>) {
    let question = input["question"].as_str().unwrap_or_default().to_string();
    let options = input["options"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value(item.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    (question, options)
}
