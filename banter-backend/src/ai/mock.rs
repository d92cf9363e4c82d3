//! Scripted completion client for tests.
//!
//! Serves a pre-configured sequence of responses and records every call
//! (input conversation, tool history, declared tools, output) so tests can
//! assert on what the orchestrator actually sent per iteration.

use crate::ai::types::{AiError, AiResponse, ToolHistoryEntry};
use crate::ai::Message;
use crate::tools::ToolDefinition;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One recorded completion call.
#[derive(Debug, Clone)]
pub struct TraceEntry {
    pub iteration: usize,
    pub input_messages: Vec<Message>,
    pub input_tool_history: Vec<ToolHistoryEntry>,
    pub input_tools: Vec<String>,
    pub output_response: Option<AiResponse>,
    pub output_error: Option<String>,
}

#[derive(Clone)]
pub struct MockAiClient {
    responses: Arc<Mutex<VecDeque<Result<AiResponse, AiError>>>>,
    trace: Arc<Mutex<Vec<TraceEntry>>>,
    /// Artificial latency per call, for exercising cancellation mid-await.
    delay: Option<Duration>,
}

impl MockAiClient {
    pub fn new(responses: Vec<Result<AiResponse, AiError>>) -> Self {
        MockAiClient {
            responses: Arc::new(Mutex::new(responses.into())),
            trace: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn generate_with_tools(
        &self,
        messages: Vec<Message>,
        tool_history: Vec<ToolHistoryEntry>,
        tools: Vec<ToolDefinition>,
    ) -> Result<AiResponse, AiError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(AiError::new("MockAiClient: response script exhausted")));

        let mut trace = self.trace.lock();
        let iteration = trace.len() + 1;
        trace.push(TraceEntry {
            iteration,
            input_messages: messages,
            input_tool_history: tool_history,
            input_tools: tools.into_iter().map(|t| t.name).collect(),
            output_response: result.as_ref().ok().cloned(),
            output_error: result.as_ref().err().map(|e| e.to_string()),
        });

        result
    }

    /// Snapshot of every call recorded so far.
    pub fn trace(&self) -> Vec<TraceEntry> {
        self.trace.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.trace.lock().len()
    }
}
