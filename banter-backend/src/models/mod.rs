use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author role of a conversation turn, persisted as a flag and never
/// re-derived from content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            _ => None,
        }
    }
}

/// One immutable message in a conversation.
///
/// `participants` is the set of other chat members visible when the message
/// was sent, used for sender labeling in the prompt transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Option<i64>,
    pub conversation_key: String,
    pub role: TurnRole,
    /// Message body; `None` for media-only messages.
    pub text: Option<String>,
    pub sender_id: String,
    pub sender_name: String,
    pub participants: Vec<String>,
    /// Platform message identifier; uniqueness makes persistence idempotent.
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(
        conversation_key: &str,
        sender_id: &str,
        sender_name: &str,
        text: &str,
        participants: Vec<String>,
    ) -> Self {
        Turn {
            id: None,
            conversation_key: conversation_key.to_string(),
            role: TurnRole::User,
            text: Some(text.to_string()),
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            participants,
            message_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(conversation_key: &str, bot_name: &str, text: &str) -> Self {
        Turn {
            id: None,
            conversation_key: conversation_key.to_string(),
            role: TurnRole::Assistant,
            text: Some(text.to_string()),
            sender_id: "bot".to_string(),
            sender_name: bot_name.to_string(),
            participants: Vec::new(),
            message_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_message_id(mut self, message_id: &str) -> Self {
        self.message_id = Some(message_id.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!(TurnRole::from_str("user"), Some(TurnRole::User));
        assert_eq!(TurnRole::from_str("assistant"), Some(TurnRole::Assistant));
        assert_eq!(TurnRole::from_str("system"), None);
        assert_eq!(TurnRole::User.as_str(), "user");
    }

    #[test]
    fn test_turn_constructors() {
        let turn = Turn::user("chat-1", "u1", "Alice", "hello", vec!["Bob".to_string()]);
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(turn.text.as_deref(), Some("hello"));
        assert!(turn.message_id.is_none());

        let turn = Turn::assistant("chat-1", "Banter", "hi").with_message_id("wamid.1");
        assert_eq!(turn.role, TurnRole::Assistant);
        assert_eq!(turn.message_id.as_deref(), Some("wamid.1"));
    }
}
