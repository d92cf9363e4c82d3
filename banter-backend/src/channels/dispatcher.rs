//! Conversation pipeline: one inbound message end to end.
//!
//! Persist the message, register for cancellation (superseding any live run
//! for the same chat), orchestrate a reply over the recent window, and act on
//! the outcome. Only `Done` produces a delivery; everything else is logged
//! and stays silent. The cancellation registration is always released on the
//! way out, guarded so a superseded run never clears a newer one.

use crate::channels::generation::{GenerationOrchestrator, SessionOutcome};
use crate::channels::types::{DeliveryChannel, DispatchResult, NormalizedMessage};
use crate::db::Database;
use crate::execution::{CancellationRegistry, GenerationTicket};
use crate::models::Turn;
use crate::tools::ToolContext;
use std::sync::Arc;

pub struct MessageDispatcher {
    db: Arc<Database>,
    cancellations: Arc<CancellationRegistry>,
    orchestrator: GenerationOrchestrator,
    delivery: Arc<dyn DeliveryChannel>,
    bot_name: String,
    history_window: usize,
}

impl MessageDispatcher {
    pub fn new(
        db: Arc<Database>,
        cancellations: Arc<CancellationRegistry>,
        orchestrator: GenerationOrchestrator,
        delivery: Arc<dyn DeliveryChannel>,
        bot_name: &str,
        history_window: usize,
    ) -> Self {
        MessageDispatcher {
            db,
            cancellations,
            orchestrator,
            delivery,
            bot_name: bot_name.to_string(),
            history_window,
        }
    }

    /// Run the pipeline for one inbound message.
    pub async fn dispatch(&self, message: NormalizedMessage) -> DispatchResult {
        log::info!(
            "[DISPATCH] Inbound message for {} from {}",
            message.chat_id,
            message.sender_name
        );

        // Best-effort: a storage failure costs this turn its place in
        // history, not the reply.
        if let Some(ref text) = message.text {
            let mut turn = Turn::user(
                &message.chat_id,
                &message.sender_id,
                &message.sender_name,
                text,
                message.participants.clone(),
            );
            if let Some(ref message_id) = message.message_id {
                turn = turn.with_message_id(message_id);
            }
            if let Err(e) = self.db.append_turn(&turn) {
                log::warn!(
                    "[DISPATCH] Failed to persist inbound message for {}: {}",
                    message.chat_id,
                    e
                );
            }
        }

        let ticket = self.cancellations.cancel_and_create(&message.chat_id);
        let result = self.run_session(&message, &ticket).await;
        self.cancellations.release(&ticket);
        result
    }

    /// Signal the live run for a conversation, if any. The run observes the
    /// token and winds down on its own.
    pub fn stop(&self, conversation_key: &str) {
        self.cancellations.cancel(conversation_key);
    }

    async fn run_session(
        &self,
        message: &NormalizedMessage,
        ticket: &GenerationTicket,
    ) -> DispatchResult {
        let key = &message.chat_id;

        let window = match self.db.recent_window(key, self.history_window) {
            Ok(window) => window,
            Err(e) => {
                log::error!("[DISPATCH] Window read failed for {}: {}", key, e);
                return DispatchResult::Failed {
                    reason: format!("window read failed: {}", e),
                };
            }
        };

        if window.is_empty() {
            log::debug!("[DISPATCH] No stored context for {}, nothing to do", key);
            return DispatchResult::NoWindow;
        }

        let context = ToolContext::new(key, &message.sender_id, &message.sender_name);
        let outcome = self
            .orchestrator
            .run(&window, &context, ticket.token())
            .await;

        match outcome {
            SessionOutcome::Done { text } => {
                if let Err(e) = self.delivery.deliver_text(key, &text).await {
                    log::error!("[DISPATCH] Delivery failed for {}: {}", key, e);
                    return DispatchResult::Failed {
                        reason: format!("delivery failed: {}", e),
                    };
                }

                let turn = Turn::assistant(key, &self.bot_name, &text);
                if let Err(e) = self.db.append_turn(&turn) {
                    log::warn!("[DISPATCH] Failed to persist reply for {}: {}", key, e);
                }

                DispatchResult::Delivered { text }
            }
            SessionOutcome::Cancelled => {
                log::info!("[DISPATCH] Run for {} superseded, staying silent", key);
                DispatchResult::Superseded
            }
            SessionOutcome::Exhausted => {
                log::warn!("[DISPATCH] Run for {} exhausted its tool budget", key);
                DispatchResult::Failed {
                    reason: "tool iteration bound reached".to_string(),
                }
            }
            SessionOutcome::Failed(e) => {
                log::error!("[DISPATCH] Run for {} failed: {}", key, e);
                DispatchResult::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
