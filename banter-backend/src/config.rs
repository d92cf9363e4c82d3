use std::env;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub anthropic_api_key: String,
    pub ai_model: String,
    /// Display name the bot uses when labeling its own turns in the prompt.
    pub bot_name: String,
    /// Upper bound on completion/tool round-trips per generation session.
    pub max_tool_iterations: usize,
    /// How many recent turns are loaded into the prompt window.
    pub history_window: usize,
    pub whatsapp_access_token: String,
    pub whatsapp_phone_number_id: String,
    pub whatsapp_verify_token: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid number"),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "./.db/banter.db".to_string()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY")
                .expect("ANTHROPIC_API_KEY must be set"),
            ai_model: env::var("AI_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string()),
            bot_name: env::var("BOT_NAME").unwrap_or_else(|_| "Banter".to_string()),
            max_tool_iterations: env::var("MAX_TOOL_ITERATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            history_window: env::var("HISTORY_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            whatsapp_access_token: env::var("WHATSAPP_ACCESS_TOKEN")
                .expect("WHATSAPP_ACCESS_TOKEN must be set"),
            whatsapp_phone_number_id: env::var("WHATSAPP_PHONE_NUMBER_ID")
                .expect("WHATSAPP_PHONE_NUMBER_ID must be set"),
            whatsapp_verify_token: env::var("WHATSAPP_VERIFY_TOKEN")
                .expect("WHATSAPP_VERIFY_TOKEN must be set"),
        }
    }
}
