pub mod claude;
pub mod mock;
pub mod types;

pub use claude::ClaudeClient;
pub use mock::{MockAiClient, TraceEntry};
pub use types::{AiError, AiResponse, ToolCall, ToolHistoryEntry, ToolResponse};

use crate::tools::ToolDefinition;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl ToString for MessageRole {
    fn to_string(&self) -> String {
        match self {
            MessageRole::System => "system".to_string(),
            MessageRole::User => "user".to_string(),
            MessageRole::Assistant => "assistant".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Unified AI client that works with any configured provider
pub enum AiClient {
    Claude(ClaudeClient),
    Mock(MockAiClient),
}

impl AiClient {
    /// Generate a completion given the running conversation, the tool rounds
    /// already executed this session, and the declared tools.
    pub async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        match self {
            AiClient::Claude(client) => {
                // Convert tool history to Claude format
                let tool_messages = Self::tool_history_to_claude(&tool_history);
                client
                    .generate_with_tools(messages, tool_messages, tools)
                    .await
            }
            AiClient::Mock(client) => {
                client
                    .generate_with_tools(messages, tool_history, tools)
                    .await
            }
        }
    }

    /// Convert tool history to Claude format
    fn tool_history_to_claude(history: &[ToolHistoryEntry]) -> Vec<types::ClaudeMessage> {
        let mut messages = Vec::new();
        for entry in history {
            let pair =
                ClaudeClient::build_tool_result_messages(&entry.tool_calls, &entry.tool_responses);
            messages.extend(pair);
        }
        messages
    }
}
