use crate::ai::types::{
    AiError, AiResponse, ClaudeContentBlock, ClaudeMessage as TypedClaudeMessage,
    ClaudeMessageContent, ClaudeTool, ToolCall, ToolResponse,
};
use crate::ai::{Message, MessageRole};
use crate::tools::ToolDefinition;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    auth_headers: header::HeaderMap,
    endpoint: String,
    model: String,
}

/// Tool choice options for Claude API
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
enum ToolChoice {
    /// Model decides whether to use tools
    Auto,
    /// Model MUST use a tool
    #[allow(dead_code)]
    Any,
    /// Model MUST use the specified tool
    #[allow(dead_code)]
    Tool { name: String },
}

#[derive(Debug, Serialize)]
struct ClaudeToolRequest {
    model: String,
    messages: Vec<TypedClaudeMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ClaudeTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Deserialize)]
struct ClaudeCompletionResponse {
    content: Vec<ClaudeResponseContent>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponseContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    input: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeError,
}

#[derive(Debug, Deserialize)]
struct ClaudeError {
    message: String,
}

impl ClaudeClient {
    pub fn new(api_key: &str, endpoint: Option<&str>, model: Option<&str>) -> Result<Self, String> {
        let mut auth_headers = header::HeaderMap::new();
        auth_headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let auth_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| format!("Invalid API key format: {}", e))?;
        auth_headers.insert("x-api-key", auth_value);
        auth_headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static("2023-06-01"),
        );

        Ok(Self {
            client: crate::http::shared_client().clone(),
            auth_headers,
            endpoint: endpoint
                .unwrap_or("https://api.anthropic.com/v1/messages")
                .to_string(),
            model: model.unwrap_or("claude-sonnet-4-20250514").to_string(),
        })
    }

    /// Generate a response with tool support
    pub async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_messages: Vec<TypedClaudeMessage>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        // Extract system message if present
        let mut system_message = None;
        let filtered_messages: Vec<Message> = messages
            .into_iter()
            .filter(|m| {
                if m.role == MessageRole::System {
                    system_message = Some(m.content.clone());
                    false
                } else {
                    true
                }
            })
            .collect();

        // Convert regular messages to typed messages
        let mut api_messages: Vec<TypedClaudeMessage> = filtered_messages
            .into_iter()
            .map(|m| TypedClaudeMessage {
                role: m.role.to_string(),
                content: ClaudeMessageContent::Text(m.content),
            })
            .collect();

        // Add tool messages (assistant tool_use + user tool_result pairs)
        api_messages.extend(tool_messages);

        // Convert tool definitions to Claude format
        let claude_tools: Vec<ClaudeTool> = tools
            .into_iter()
            .map(|t| ClaudeTool {
                name: t.name,
                description: t.description,
                input_schema: serde_json::to_value(t.input_schema).unwrap_or_default(),
            })
            .collect();

        let has_tools = !claude_tools.is_empty();
        let request = ClaudeToolRequest {
            model: self.model.clone(),
            messages: api_messages,
            max_tokens: 4096,
            system: system_message,
            tools: if has_tools {
                Some(claude_tools)
            } else {
                None
            },
            // Whether to answer directly or act is the model's call
            tool_choice: if has_tools {
                Some(ToolChoice::Auto)
            } else {
                None
            },
        };

        log::debug!(
            "Sending tool request to Claude API: {}",
            serde_json::to_string_pretty(&request).unwrap_or_default()
        );

        // Retry configuration for transient errors
        const MAX_RETRIES: u32 = 3;
        const BASE_DELAY_MS: u64 = 2000;

        let mut last_error: Option<(String, Option<u16>)> = None;
        let mut response_data_opt: Option<ClaudeCompletionResponse> = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay_ms = BASE_DELAY_MS * (1 << (attempt - 1));
                log::warn!(
                    "[CLAUDE] Retry attempt {}/{} after {}ms delay",
                    attempt,
                    MAX_RETRIES,
                    delay_ms
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            let request_result = self
                .client
                .post(&self.endpoint)
                .headers(self.auth_headers.clone())
                .json(&request)
                .send()
                .await;

            let response = match request_result {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some((format!("Claude API request failed: {}", e), None));
                    if attempt < MAX_RETRIES {
                        log::warn!("[CLAUDE] Request failed (attempt {}): {}, will retry", attempt + 1, e);
                        continue;
                    }
                    let (msg, code) = last_error.unwrap();
                    return Err(match code {
                        Some(c) => AiError::with_status(msg, c),
                        None => AiError::new(msg),
                    });
                }
            };

            let status = response.status();
            let status_code = status.as_u16();
            let is_retryable = matches!(status_code, 429 | 502 | 503 | 504 | 529);

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();

                if is_retryable && attempt < MAX_RETRIES {
                    log::warn!(
                        "[CLAUDE] Received retryable status {} (attempt {}), will retry",
                        status,
                        attempt + 1
                    );
                    last_error = Some((format!("HTTP {}: {}", status, error_text), Some(status_code)));
                    continue;
                }

                let error_msg = if let Ok(error_response) = serde_json::from_str::<ClaudeErrorResponse>(&error_text) {
                    format!("Claude API error: {}", error_response.error.message)
                } else {
                    format!("Claude API returned error status: {}, body: {}", status, error_text)
                };

                return Err(AiError::with_status(error_msg, status_code));
            }

            response_data_opt = Some(response
                .json()
                .await
                .map_err(|e| AiError::new(format!("Failed to parse Claude response: {}", e)))?);
            break;
        }

        let response_data = response_data_opt.ok_or_else(|| {
            let (msg, code) = last_error.unwrap_or_else(|| ("Max retries exceeded".to_string(), None));
            match code {
                Some(c) => AiError::with_status(msg, c),
                None => AiError::new(msg),
            }
        })?;

        // Parse the response content
        let mut text_content = String::new();
        let mut tool_calls = Vec::new();

        for content in response_data.content {
            match content.content_type.as_str() {
                "text" => {
                    if let Some(text) = content.text {
                        text_content.push_str(&text);
                    }
                }
                "tool_use" => {
                    if let (Some(id), Some(name), Some(input)) =
                        (content.id, content.name, content.input)
                    {
                        tool_calls.push(ToolCall {
                            id,
                            name,
                            arguments: input,
                        });
                    }
                }
                _ => {}
            }
        }

        Ok(AiResponse {
            content: text_content,
            tool_calls,
            stop_reason: response_data.stop_reason,
        })
    }

    /// Build tool result messages to continue conversation after tool execution
    pub fn build_tool_result_messages(
        tool_calls: &[ToolCall],
        tool_responses: &[ToolResponse],
    ) -> Vec<TypedClaudeMessage> {
        // First message: assistant with tool_use blocks
        let tool_use_blocks: Vec<ClaudeContentBlock> = tool_calls
            .iter()
            .map(|tc| ClaudeContentBlock::ToolUse {
                id: tc.id.clone(),
                name: tc.name.clone(),
                input: tc.arguments.clone(),
            })
            .collect();

        // Second message: user with tool_result blocks
        let tool_result_blocks: Vec<ClaudeContentBlock> = tool_responses
            .iter()
            .map(|tr| ClaudeContentBlock::tool_result(
                tr.tool_call_id.clone(),
                tr.content.clone(),
                tr.is_error,
            ))
            .collect();

        vec![
            TypedClaudeMessage::assistant_with_blocks(tool_use_blocks),
            TypedClaudeMessage::user_with_tool_results(tool_result_blocks),
        ]
    }
}
