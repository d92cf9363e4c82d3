use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Tool declaration exposed to the completion service. Immutable, built at
/// process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON Schema (object form) for a tool's parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertySchema>,
    pub required: Vec<String>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

/// Caller-scoped data passed to every executor. Carries who asked and where,
/// never grown into shared state.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub conversation_key: String,
    pub sender_id: String,
    pub sender_name: String,
}

impl ToolContext {
    pub fn new(conversation_key: &str, sender_id: &str, sender_name: &str) -> Self {
        ToolContext {
            conversation_key: conversation_key.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
        }
    }
}

/// Outcome of one tool execution. Executors convert their own failures into
/// an error-shaped result; they never panic or propagate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        ToolResult {
            success: true,
            content: content.into(),
            error: None,
            metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        ToolResult {
            success: false,
            content: message.clone(),
            error: Some(message),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_result_shapes() {
        let ok = ToolResult::success("done");
        assert!(ok.success);
        assert!(ok.error.is_none());

        let err = ToolResult::error("boom");
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("boom"));
        assert_eq!(err.content, "boom");
    }

    #[test]
    fn test_input_schema_serializes_to_json_schema() {
        let mut properties = HashMap::new();
        properties.insert(
            "query".to_string(),
            PropertySchema {
                schema_type: "string".to_string(),
                description: "The search query".to_string(),
                default: None,
                items: None,
                enum_values: None,
            },
        );
        let schema = ToolInputSchema {
            schema_type: "object".to_string(),
            properties,
            required: vec!["query".to_string()],
        };

        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(value["type"], json!("object"));
        assert_eq!(value["properties"]["query"]["type"], json!("string"));
        assert_eq!(value["required"], json!(["query"]));
    }
}
