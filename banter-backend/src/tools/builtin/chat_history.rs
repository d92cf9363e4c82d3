//! Chat history lookup tool
//!
//! Reaches past the prompt window: pulls a participant's earlier messages
//! from storage so the model can answer "what did X say about ...".

use crate::db::Database;
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

pub struct ChatHistoryTool {
    definition: ToolDefinition,
    db: Arc<Database>,
}

impl ChatHistoryTool {
    pub fn new(db: Arc<Database>) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "participant".to_string(),
            PropertySchema {
                schema_type: "string".to_string(),
                description: "Display name of the participant whose messages to retrieve."
                    .to_string(),
                default: None,
                items: None,
                enum_values: None,
            },
        );
        properties.insert(
            "limit".to_string(),
            PropertySchema {
                schema_type: "integer".to_string(),
                description: format!(
                    "Maximum number of messages to return (default {}, max {}).",
                    DEFAULT_LIMIT, MAX_LIMIT
                ),
                default: Some(serde_json::json!(DEFAULT_LIMIT)),
                items: None,
                enum_values: None,
            },
        );

        ChatHistoryTool {
            definition: ToolDefinition {
                name: "chat_history".to_string(),
                description: "Retrieve earlier messages from a specific participant in this chat, beyond what is visible in the current context.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["participant".to_string()],
                },
            },
            db,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatHistoryParams {
    participant: String,
    limit: Option<usize>,
}

#[async_trait]
impl Tool for ChatHistoryTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: ChatHistoryParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        if params.participant.trim().is_empty() {
            return ToolResult::error("Participant name must not be empty");
        }

        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let turns = match self.db.sender_history(
            &context.conversation_key,
            params.participant.trim(),
            limit,
        ) {
            Ok(turns) => turns,
            Err(e) => return ToolResult::error(format!("History lookup failed: {}", e)),
        };

        if turns.is_empty() {
            return ToolResult::success(format!(
                "No messages from '{}' found in this chat.",
                params.participant.trim()
            ));
        }

        // Stored newest-first; present oldest-first for readability
        let lines: Vec<String> = turns
            .iter()
            .rev()
            .map(|t| {
                format!(
                    "[{}] {}: {}",
                    t.created_at.format("%Y-%m-%d %H:%M"),
                    t.sender_name,
                    t.text.as_deref().unwrap_or("<no text>")
                )
            })
            .collect();

        ToolResult::success(lines.join("\n"))
            .with_metadata(serde_json::json!({ "count": turns.len() }))
    }
}
