use crate::tools::types::{ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Trait that all tools must implement
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition for the AI API
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool with the given parameters.
    ///
    /// Implementations validate their own argument shape and return an
    /// error-shaped `ToolResult` on any failure.
    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult;

    /// Returns the tool's name
    fn name(&self) -> String {
        self.definition().name.clone()
    }
}

/// Dispatch was asked for a name no tool was registered under. The only
/// dispatch failure that reaches the caller; executor failures come back as
/// error-shaped results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTool(pub String);

impl fmt::Display for UnknownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tool '{}' not found", self.0)
    }
}

impl std::error::Error for UnknownTool {}

/// Registry that holds all available tools.
///
/// Uses interior mutability (RwLock) so registration takes &self; insertion
/// order is tracked so `declarations()` is stable across calls.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
    order: RwLock<Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        ToolRegistry {
            tools: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Register a tool (thread-safe, takes &self via interior mutability)
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        if self.tools.write().insert(name.clone(), tool).is_none() {
            self.order.write().push(name);
        }
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Declarations for every registered tool, in registration order.
    /// Sent verbatim to the completion service on each request.
    pub fn declarations(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read();
        self.order
            .read()
            .iter()
            .filter_map(|name| tools.get(name).map(|t| t.definition()))
            .collect()
    }

    /// Execute a tool by name.
    ///
    /// Fails only with `UnknownTool`; a registered executor's failure is
    /// returned as an error-shaped `ToolResult`, never as an `Err`.
    pub async fn dispatch(
        &self,
        name: &str,
        params: Value,
        context: &ToolContext,
    ) -> Result<ToolResult, UnknownTool> {
        let tool = self
            .get(name)
            .ok_or_else(|| UnknownTool(name.to_string()))?;

        Ok(tool.execute(params, context).await)
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Get count of registered tools
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
