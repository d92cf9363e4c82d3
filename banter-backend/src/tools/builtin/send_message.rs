//! Send message tool for chat communication
//!
//! Lets the model push an intermediate text into the chat before its run is
//! over (e.g. "looking that up now"), through the same delivery channel the
//! pipeline uses for final replies.

use crate::channels::DeliveryChannel;
use crate::db::Database;
use crate::models::Turn;
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub struct SendMessageTool {
    definition: ToolDefinition,
    delivery: Arc<dyn DeliveryChannel>,
    db: Arc<Database>,
    bot_name: String,
}

impl SendMessageTool {
    pub fn new(delivery: Arc<dyn DeliveryChannel>, db: Arc<Database>, bot_name: &str) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "message".to_string(),
            PropertySchema {
                schema_type: "string".to_string(),
                description: "The message text to send to the chat.".to_string(),
                default: None,
                items: None,
                enum_values: None,
            },
        );

        SendMessageTool {
            definition: ToolDefinition {
                name: "send_message".to_string(),
                description: "Send a text message to the current chat immediately, before your final reply. Use for progress updates or when a partial answer is worth sending on its own.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["message".to_string()],
                },
            },
            delivery,
            db,
            bot_name: bot_name.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageParams {
    message: String,
}

#[async_trait]
impl Tool for SendMessageTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: SendMessageParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        if params.message.trim().is_empty() {
            return ToolResult::error("Message must not be empty");
        }

        if let Err(e) = self
            .delivery
            .deliver_text(&context.conversation_key, &params.message)
            .await
        {
            return ToolResult::error(format!("Failed to send message: {}", e));
        }

        // Best-effort: the sent message becomes part of the conversation record
        let turn = Turn::assistant(&context.conversation_key, &self.bot_name, &params.message);
        if let Err(e) = self.db.append_turn(&turn) {
            log::warn!("[SEND_MESSAGE] Failed to persist sent message: {}", e);
        }

        ToolResult::success("Message sent")
    }
}
