pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::{Tool, ToolRegistry};
pub use types::{PropertySchema, ToolContext, ToolDefinition, ToolInputSchema, ToolResult};

use crate::channels::DeliveryChannel;
use crate::db::Database;
use builtin::{ChatHistoryTool, SendMessageTool, SendVoiceNoteTool, WebSearchTool};
use std::sync::Arc;

/// Build the registry with all builtin tools, in the order they are
/// declared to the model.
pub fn create_default_registry(
    db: Arc<Database>,
    delivery: Arc<dyn DeliveryChannel>,
    bot_name: &str,
) -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();

    registry.register(Arc::new(SendMessageTool::new(
        delivery.clone(),
        db.clone(),
        bot_name,
    )));
    registry.register(Arc::new(ChatHistoryTool::new(db)));
    registry.register(Arc::new(WebSearchTool::new()));
    registry.register(Arc::new(SendVoiceNoteTool::new(delivery)));

    log::info!("[TOOLS] Registered {} builtin tools", registry.len());
    Arc::new(registry)
}
