//! Channel-facing types shared by the webhook controller, the dispatcher
//! and the delivery adapters.

use async_trait::async_trait;

/// An inbound chat message after platform-specific parsing. The dispatcher
/// only ever sees this shape.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    /// Conversation key (the platform chat identifier).
    pub chat_id: String,
    /// Platform message identifier, when the platform provides one.
    pub message_id: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    /// Message body; `None` for media-only messages.
    pub text: Option<String>,
    /// Other chat members visible at send time.
    pub participants: Vec<String>,
}

/// Terminal outcome of one dispatch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// A reply was generated and delivered.
    Delivered { text: String },
    /// No stored context to respond to; nothing was generated.
    NoWindow,
    /// A newer message for the same conversation superseded this run.
    Superseded,
    /// The run failed; logged but nothing was delivered.
    Failed { reason: String },
}

/// Outbound side of a chat platform. Tools and the dispatcher deliver
/// through this seam; tests substitute a recording implementation.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn deliver_text(&self, conversation_key: &str, text: &str) -> Result<(), String>;

    async fn deliver_audio(&self, conversation_key: &str, media_url: &str) -> Result<(), String>;
}
