//! WhatsApp Cloud API webhook endpoints.
//!
//! GET handles the platform's subscription handshake; POST ingests message
//! events, normalizes them and hands each off to the dispatcher on a
//! detached task so the webhook always acknowledges fast.

use crate::channels::NormalizedMessage;
use crate::AppState;
use actix_web::{get, post, web, HttpResponse, Responder};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

#[get("/webhook")]
async fn verify(state: web::Data<AppState>, query: web::Query<VerifyQuery>) -> impl Responder {
    let subscribe = query.mode.as_deref() == Some("subscribe");
    let token_ok = query.verify_token.as_deref() == Some(state.config.whatsapp_verify_token.as_str());

    if subscribe && token_ok {
        log::info!("[WEBHOOK] Subscription verified");
        HttpResponse::Ok().body(query.into_inner().challenge.unwrap_or_default())
    } else {
        log::warn!("[WEBHOOK] Subscription verification rejected");
        HttpResponse::Forbidden().finish()
    }
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
struct Change {
    value: ChangeValue,
}

#[derive(Debug, Deserialize)]
struct ChangeValue {
    #[serde(default)]
    contacts: Vec<Contact>,
    #[serde(default)]
    messages: Vec<InboundMessage>,
}

#[derive(Debug, Deserialize)]
struct Contact {
    wa_id: String,
    profile: ContactProfile,
}

#[derive(Debug, Deserialize)]
struct ContactProfile {
    name: String,
}

#[derive(Debug, Deserialize)]
struct InboundMessage {
    from: String,
    id: String,
    #[serde(rename = "type")]
    message_type: String,
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    body: String,
}

#[post("/webhook")]
async fn ingest(state: web::Data<AppState>, payload: web::Json<WebhookPayload>) -> impl Responder {
    for entry in &payload.entry {
        for change in &entry.changes {
            for message in &change.value.messages {
                let normalized = normalize(message, &change.value.contacts);

                let dispatcher = state.dispatcher.clone();
                // Detached: the webhook acknowledges immediately, delivery
                // happens on its own time.
                tokio::spawn(async move {
                    dispatcher.dispatch(normalized).await;
                });
            }
        }
    }

    HttpResponse::Ok().body("EVENT_RECEIVED")
}

fn normalize(message: &InboundMessage, contacts: &[Contact]) -> NormalizedMessage {
    let sender_name = contacts
        .iter()
        .find(|c| c.wa_id == message.from)
        .map(|c| c.profile.name.clone())
        .unwrap_or_else(|| message.from.clone());

    let participants: Vec<String> = contacts
        .iter()
        .filter(|c| c.wa_id != message.from)
        .map(|c| c.profile.name.clone())
        .collect();

    // Non-text messages still flow through the pipeline; they just carry no
    // body and are never persisted.
    let text = if message.message_type == "text" {
        message.text.as_ref().map(|t| t.body.clone())
    } else {
        None
    };

    NormalizedMessage {
        chat_id: message.from.clone(),
        message_id: Some(message.id.clone()),
        sender_id: message.from.clone(),
        sender_name,
        text,
        participants,
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(verify).service(ingest);
}
