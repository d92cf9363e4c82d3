//! Voice note tool
//!
//! Forwards a hosted audio clip into the chat. The URL is validated here
//! rather than trusted from the model: it must parse, be https, and stay
//! under a sane length.

use crate::channels::DeliveryChannel;
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

const MAX_URL_LEN: usize = 2048;

pub struct SendVoiceNoteTool {
    definition: ToolDefinition,
    delivery: Arc<dyn DeliveryChannel>,
}

impl SendVoiceNoteTool {
    pub fn new(delivery: Arc<dyn DeliveryChannel>) -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "media_url".to_string(),
            PropertySchema {
                schema_type: "string".to_string(),
                description: "HTTPS URL of the hosted audio clip to send.".to_string(),
                default: None,
                items: None,
                enum_values: None,
            },
        );

        SendVoiceNoteTool {
            definition: ToolDefinition {
                name: "send_voice_note".to_string(),
                description: "Send a voice note (hosted audio clip) to the current chat."
                    .to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["media_url".to_string()],
                },
            },
            delivery,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendVoiceNoteParams {
    media_url: String,
}

#[async_trait]
impl Tool for SendVoiceNoteTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: SendVoiceNoteParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };

        if params.media_url.len() > MAX_URL_LEN {
            return ToolResult::error("Media URL is too long");
        }

        let parsed = match Url::parse(&params.media_url) {
            Ok(u) => u,
            Err(e) => return ToolResult::error(format!("Invalid media URL: {}", e)),
        };

        if parsed.scheme() != "https" {
            return ToolResult::error("Media URL must use https");
        }

        if let Err(e) = self
            .delivery
            .deliver_audio(&context.conversation_key, params.media_url.as_str())
            .await
        {
            return ToolResult::error(format!("Failed to send voice note: {}", e));
        }

        ToolResult::success("Voice note sent")
    }
}
