pub mod chat_history;
pub mod send_message;
pub mod send_voice_note;
pub mod web_search;

pub use chat_history::ChatHistoryTool;
pub use send_message::SendMessageTool;
pub use send_voice_note::SendVoiceNoteTool;
pub use web_search::WebSearchTool;
