//! WhatsApp Cloud API delivery adapter.
//!
//! Sends outbound messages through the Graph API `/{phone_number_id}/messages`
//! endpoint using the shared HTTP client.

use crate::channels::types::DeliveryChannel;
use crate::http::shared_client;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

const GRAPH_API_BASE: &str = "https://graph.facebook.com/v19.0";

#[derive(Clone)]
pub struct WhatsAppChannel {
    access_token: String,
    phone_number_id: String,
    api_base: String,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<TextBody<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<AudioBody<'a>>,
}

#[derive(Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct AudioBody<'a> {
    link: &'a str,
}

impl WhatsAppChannel {
    pub fn new(access_token: &str, phone_number_id: &str) -> Self {
        WhatsAppChannel {
            access_token: access_token.to_string(),
            phone_number_id: phone_number_id.to_string(),
            api_base: GRAPH_API_BASE.to_string(),
        }
    }

    async fn post_message(&self, payload: &OutboundMessage<'_>) -> Result<(), String> {
        let url = format!("{}/{}/messages", self.api_base, self.phone_number_id);

        let response = shared_client()
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("WhatsApp request failed: {}", e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let detail = body
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .unwrap_or("no error detail");
        Err(format!(
            "WhatsApp API returned HTTP {}: {}",
            status.as_u16(),
            detail
        ))
    }
}

#[async_trait]
impl DeliveryChannel for WhatsAppChannel {
    async fn deliver_text(&self, conversation_key: &str, text: &str) -> Result<(), String> {
        log::debug!(
            "[WHATSAPP] Sending text to {} ({} chars)",
            conversation_key,
            text.len()
        );

        self.post_message(&OutboundMessage {
            messaging_product: "whatsapp",
            to: conversation_key,
            message_type: "text",
            text: Some(TextBody { body: text }),
            audio: None,
        })
        .await
    }

    async fn deliver_audio(&self, conversation_key: &str, media_url: &str) -> Result<(), String> {
        log::debug!("[WHATSAPP] Sending audio to {}", conversation_key);

        self.post_message(&OutboundMessage {
            messaging_product: "whatsapp",
            to: conversation_key,
            message_type: "audio",
            text: None,
            audio: Some(AudioBody { link: media_url }),
        })
        .await
    }
}
