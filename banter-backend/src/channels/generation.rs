//! Generation orchestrator: one reply session over a conversation window.
//!
//! Runs the completion/tool loop for a single inbound message: builds the
//! prompt transcript, calls the model, executes requested tools sequentially,
//! and feeds their results back until the model produces a final text or the
//! session terminates some other way. Cancellation is observed at every
//! suspension point; the caller owns delivery and persistence.

use crate::ai::{AiClient, AiError, Message, MessageRole, ToolCall, ToolHistoryEntry, ToolResponse};
use crate::models::{Turn, TurnRole};
use crate::tools::{ToolContext, ToolRegistry};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Tool output beyond this many characters is truncated in the model-facing
/// context. Side effects always run on the full result first.
pub const TOOL_RESULT_MAX_CHARS: usize = 2000;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// Where a session currently is. Transitions are logged, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Building,
    AwaitingCompletion,
    ExecutingTools,
    Done,
    Cancelled,
    Failed,
    Exhausted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Building => "BUILDING",
            SessionState::AwaitingCompletion => "AWAITING_COMPLETION",
            SessionState::ExecutingTools => "EXECUTING_TOOLS",
            SessionState::Done => "DONE",
            SessionState::Cancelled => "CANCELLED",
            SessionState::Failed => "FAILED",
            SessionState::Exhausted => "EXHAUSTED",
        };
        write!(f, "{}", s)
    }
}

/// Why a session failed. All variants are terminal and logged by the caller;
/// none produce a delivery.
#[derive(Debug)]
pub enum SessionError {
    /// The completion service failed (after retries).
    Service(AiError),
    /// The model produced neither text nor tool calls.
    NoResponse,
    /// The model named a tool the registry does not hold.
    UnknownTool(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Service(e) => write!(f, "completion service error: {}", e),
            SessionError::NoResponse => write!(f, "model produced neither text nor tool calls"),
            SessionError::UnknownTool(name) => write!(f, "unknown tool '{}'", name),
        }
    }
}

impl std::error::Error for SessionError {}

/// Terminal outcome of one session.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Final reply text, ready for delivery.
    Done { text: String },
    /// Superseded or explicitly stopped; the caller stays silent.
    Cancelled,
    /// The model kept requesting tool rounds past the configured bound.
    Exhausted,
    Failed(SessionError),
}

pub struct GenerationOrchestrator {
    ai: Arc<AiClient>,
    tools: Arc<ToolRegistry>,
    bot_name: String,
    /// Completion/execution round bound; exceeding it ends the session as
    /// `Exhausted` rather than silently dropping tool calls.
    max_tool_iterations: usize,
}

impl GenerationOrchestrator {
    pub fn new(
        ai: Arc<AiClient>,
        tools: Arc<ToolRegistry>,
        bot_name: &str,
        max_tool_iterations: usize,
    ) -> Self {
        GenerationOrchestrator {
            ai,
            tools,
            bot_name: bot_name.to_string(),
            max_tool_iterations,
        }
    }

    /// Run one session over a window of turns (newest first, as read from
    /// storage). The token is polled at every await; a signaled token ends
    /// the session as `Cancelled` without touching the caller's state.
    pub async fn run(
        &self,
        window: &[Turn],
        context: &ToolContext,
        token: &CancellationToken,
    ) -> SessionOutcome {
        let key = &context.conversation_key;
        log::debug!("[GENERATE] {} session state: {}", key, SessionState::Building);

        let messages = self.build_messages(window);
        let declarations = self.tools.declarations();

        let mut tool_history: Vec<ToolHistoryEntry> = Vec::new();
        let mut iterations: usize = 0;

        loop {
            if token.is_cancelled() {
                log::info!("[GENERATE] {} session state: {}", key, SessionState::Cancelled);
                return SessionOutcome::Cancelled;
            }

            log::debug!(
                "[GENERATE] {} session state: {} (round {})",
                key,
                SessionState::AwaitingCompletion,
                iterations + 1
            );

            let response = tokio::select! {
                _ = token.cancelled() => {
                    log::info!("[GENERATE] {} session state: {}", key, SessionState::Cancelled);
                    return SessionOutcome::Cancelled;
                }
                result = self.ai.generate_with_tools(
                    messages.clone(),
                    tool_history.clone(),
                    declarations.clone(),
                ) => match result {
                    Ok(response) => response,
                    Err(e) => {
                        log::error!(
                            "[GENERATE] {} session state: {} ({})",
                            key,
                            SessionState::Failed,
                            e
                        );
                        return SessionOutcome::Failed(SessionError::Service(e));
                    }
                }
            };

            if !response.has_tool_calls() {
                let text = response.content.trim().to_string();
                if text.is_empty() {
                    log::warn!(
                        "[GENERATE] {} session state: {} (no text, no tool calls)",
                        key,
                        SessionState::Failed
                    );
                    return SessionOutcome::Failed(SessionError::NoResponse);
                }
                log::info!("[GENERATE] {} session state: {}", key, SessionState::Done);
                return SessionOutcome::Done { text };
            }

            if iterations >= self.max_tool_iterations {
                log::warn!(
                    "[GENERATE] {} session state: {} after {} tool rounds",
                    key,
                    SessionState::Exhausted,
                    iterations
                );
                return SessionOutcome::Exhausted;
            }

            log::debug!(
                "[GENERATE] {} session state: {} ({} calls)",
                key,
                SessionState::ExecutingTools,
                response.tool_calls.len()
            );

            // Only invocations that actually dispatched go into the recorded
            // round: the wire format pairs every tool_use block with a
            // tool_result block, so a skipped call must not appear on either
            // side.
            let mut dispatched: Vec<ToolCall> = Vec::new();
            let mut responses: Vec<ToolResponse> = Vec::new();
            for call in response.tool_calls {
                if token.is_cancelled() {
                    log::info!("[GENERATE] {} session state: {}", key, SessionState::Cancelled);
                    return SessionOutcome::Cancelled;
                }

                if call.name.trim().is_empty() || !call.arguments.is_object() {
                    log::warn!(
                        "[GENERATE] {} skipping malformed tool invocation (id {})",
                        key,
                        call.id
                    );
                    continue;
                }

                let result = match self
                    .tools
                    .dispatch(&call.name, call.arguments.clone(), context)
                    .await
                {
                    Ok(result) => result,
                    Err(unknown) => {
                        log::error!(
                            "[GENERATE] {} session state: {} ({})",
                            key,
                            SessionState::Failed,
                            unknown
                        );
                        return SessionOutcome::Failed(SessionError::UnknownTool(unknown.0));
                    }
                };

                // Side effects already ran on the full result above; only the
                // model-facing copy is truncated.
                let content = truncate_for_model(&result.content);
                responses.push(if result.success {
                    ToolResponse::success(call.id.clone(), content)
                } else {
                    ToolResponse::error(call.id.clone(), content)
                });
                dispatched.push(call);
            }

            // A round where every invocation was skipped leaves nothing to
            // report back; recording it would send empty message blocks.
            if !dispatched.is_empty() {
                tool_history.push(ToolHistoryEntry::new(dispatched, responses));
            }
            iterations += 1;
        }
    }

    /// Serialize the window into the prompt: a system message plus one
    /// synthesized user turn holding the transcript oldest-first.
    fn build_messages(&self, window: &[Turn]) -> Vec<Message> {
        let system = format!(
            "You are {}, a participant in a group chat. The last user message \
             is addressed to you; reply to it in the context of the transcript. \
             Reply with message text only, no sender label.",
            self.bot_name
        );

        // Stored newest first; the model reads oldest first.
        let transcript: Vec<String> = window
            .iter()
            .rev()
            .filter_map(|turn| {
                let text = turn.text.as_deref()?;
                Some(match turn.role {
                    TurnRole::Assistant => format!("{}: {}", turn.sender_name, text),
                    TurnRole::User if turn.participants.is_empty() => {
                        format!("{}: {}", turn.sender_name, text)
                    }
                    TurnRole::User => format!(
                        "{} (with {}): {}",
                        turn.sender_name,
                        turn.participants.join(", "),
                        text
                    ),
                })
            })
            .collect();

        vec![
            Message {
                role: MessageRole::System,
                content: system,
            },
            Message {
                role: MessageRole::User,
                content: transcript.join("\n"),
            },
        ]
    }
}

fn truncate_for_model(content: &str) -> String {
    if content.chars().count() <= TOOL_RESULT_MAX_CHARS {
        return content.to_string();
    }
    let head: String = content.chars().take(TOOL_RESULT_MAX_CHARS).collect();
    format!("{}{}", head, TRUNCATION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AiResponse, MockAiClient, ToolCall};
    use crate::tools::{
        PropertySchema, Tool, ToolDefinition, ToolInputSchema, ToolResult,
    };
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::time::Duration;

    struct StubTool {
        name: String,
        output: String,
        fail: bool,
        calls: Mutex<Vec<Value>>,
    }

    impl StubTool {
        fn new(name: &str, output: &str) -> Arc<Self> {
            Arc::new(StubTool {
                name: name.to_string(),
                output: output.to_string(),
                fail: false,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &str, error: &str) -> Arc<Self> {
            Arc::new(StubTool {
                name: name.to_string(),
                output: error.to_string(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Tool for StubTool {
        fn definition(&self) -> ToolDefinition {
            let mut properties = HashMap::new();
            properties.insert(
                "input".to_string(),
                PropertySchema {
                    schema_type: "string".to_string(),
                    description: "stub input".to_string(),
                    default: None,
                    items: None,
                    enum_values: None,
                },
            );
            ToolDefinition {
                name: self.name.clone(),
                description: format!("Stub {} tool", self.name),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec![],
                },
            }
        }

        async fn execute(&self, params: Value, _context: &ToolContext) -> ToolResult {
            self.calls.lock().push(params);
            if self.fail {
                ToolResult::error(self.output.clone())
            } else {
                ToolResult::success(self.output.clone())
            }
        }
    }

    fn orchestrator(
        responses: Vec<Result<AiResponse, AiError>>,
        tools: Arc<ToolRegistry>,
        max_iterations: usize,
    ) -> (GenerationOrchestrator, MockAiClient) {
        let mock = MockAiClient::new(responses);
        let orchestrator = GenerationOrchestrator::new(
            Arc::new(AiClient::Mock(mock.clone())),
            tools,
            "Banter",
            max_iterations,
        );
        (orchestrator, mock)
    }

    fn window() -> Vec<Turn> {
        // Newest first, as recent_window returns
        vec![
            Turn::user("chat-1", "u1", "Alice", "what's the weather?", vec!["Bob".to_string(), "Carol".to_string()]),
            Turn::assistant("chat-1", "Banter", "hi all"),
            Turn::user("chat-1", "u2", "Bob", "hello bot", vec![]),
        ]
    }

    fn context() -> ToolContext {
        ToolContext::new("chat-1", "u1", "Alice")
    }

    #[tokio::test]
    async fn test_simple_reply() {
        let (orchestrator, mock) = orchestrator(
            vec![Ok(AiResponse::text("Sunny, 22C.".to_string()))],
            Arc::new(ToolRegistry::new()),
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        match outcome {
            SessionOutcome::Done { text } => assert_eq!(text, "Sunny, 22C."),
            other => panic!("expected Done, got {:?}", other),
        }
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transcript_is_oldest_first_with_labels() {
        let (orchestrator, mock) = orchestrator(
            vec![Ok(AiResponse::text("ok".to_string()))],
            Arc::new(ToolRegistry::new()),
            8,
        );

        orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;

        let trace = mock.trace();
        let user_message = &trace[0].input_messages[1];
        assert_eq!(user_message.role, MessageRole::User);
        assert_eq!(
            user_message.content,
            "Bob: hello bot\nBanter: hi all\nAlice (with Bob, Carol): what's the weather?"
        );
    }

    #[tokio::test]
    async fn test_no_response_fails() {
        let (orchestrator, _) = orchestrator(
            vec![Ok(AiResponse::text("   ".to_string()))],
            Arc::new(ToolRegistry::new()),
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(SessionError::NoResponse)
        ));
    }

    #[tokio::test]
    async fn test_service_error_fails() {
        let (orchestrator, _) = orchestrator(
            vec![Err(AiError::with_status("overloaded", 529))],
            Arc::new(ToolRegistry::new()),
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        assert!(matches!(
            outcome,
            SessionOutcome::Failed(SessionError::Service(_))
        ));
    }

    #[tokio::test]
    async fn test_tool_round_then_reply() {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(StubTool::new("lookup", "42"));

        let (orchestrator, mock) = orchestrator(
            vec![
                Ok(AiResponse::with_tools(
                    String::new(),
                    vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "lookup".to_string(),
                        arguments: json!({"input": "answer"}),
                    }],
                )),
                Ok(AiResponse::text("The answer is 42.".to_string())),
            ],
            tools,
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SessionOutcome::Done { .. }));

        // Second call carries the executed round
        let trace = mock.trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1].input_tool_history.len(), 1);
        assert_eq!(trace[1].input_tool_history[0].tool_responses[0].content, "42");
    }

    #[tokio::test]
    async fn test_partial_tool_failure_still_responds_to_all_calls() {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(StubTool::new("alpha", "ok-a"));
        tools.register(StubTool::failing("beta", "Invalid parameters: missing field"));
        tools.register(StubTool::new("gamma", "ok-c"));

        let calls: Vec<ToolCall> = ["alpha", "beta", "gamma"]
            .iter()
            .enumerate()
            .map(|(i, name)| ToolCall {
                id: format!("call_{}", i),
                name: name.to_string(),
                arguments: json!({}),
            })
            .collect();

        let (orchestrator, mock) = orchestrator(
            vec![
                Ok(AiResponse::with_tools(String::new(), calls)),
                Ok(AiResponse::text("done".to_string())),
            ],
            tools,
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SessionOutcome::Done { .. }));

        let trace = mock.trace();
        let responses = &trace[1].input_tool_history[0].tool_responses;
        assert_eq!(responses.len(), 3);
        assert!(!responses[0].is_error);
        assert!(responses[1].is_error);
        assert!(!responses[2].is_error);
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_session() {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(StubTool::new("lookup", "42"));

        let (orchestrator, _) = orchestrator(
            vec![Ok(AiResponse::with_tools(
                String::new(),
                vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "no_such_tool".to_string(),
                    arguments: json!({}),
                }],
            ))],
            tools,
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        match outcome {
            SessionOutcome::Failed(SessionError::UnknownTool(name)) => {
                assert_eq!(name, "no_such_tool")
            }
            other => panic!("expected UnknownTool, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_invocation_skipped() {
        let tools = Arc::new(ToolRegistry::new());
        let stub = StubTool::new("lookup", "42");
        tools.register(stub.clone());

        let (orchestrator, mock) = orchestrator(
            vec![
                Ok(AiResponse::with_tools(
                    String::new(),
                    vec![
                        ToolCall {
                            id: "call_1".to_string(),
                            name: "".to_string(),
                            arguments: json!({}),
                        },
                        ToolCall {
                            id: "call_2".to_string(),
                            name: "lookup".to_string(),
                            arguments: json!("not an object"),
                        },
                        ToolCall {
                            id: "call_3".to_string(),
                            name: "lookup".to_string(),
                            arguments: json!({}),
                        },
                    ],
                )),
                Ok(AiResponse::text("done".to_string())),
            ],
            tools,
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SessionOutcome::Done { .. }));

        // Only the well-formed call executed
        assert_eq!(stub.calls.lock().len(), 1);

        // The recorded round holds only the dispatched call, with its
        // response paired to it
        let history = &mock.trace()[1].input_tool_history[0];
        assert_eq!(history.tool_calls.len(), 1);
        assert_eq!(history.tool_calls[0].id, "call_3");
        assert_eq!(history.tool_responses.len(), 1);
        assert_eq!(history.tool_responses[0].tool_call_id, "call_3");
    }

    #[tokio::test]
    async fn test_all_skipped_round_records_no_history() {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(StubTool::new("lookup", "42"));

        let (orchestrator, mock) = orchestrator(
            vec![
                Ok(AiResponse::with_tools(
                    String::new(),
                    vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "".to_string(),
                        arguments: json!({}),
                    }],
                )),
                Ok(AiResponse::text("done".to_string())),
            ],
            tools,
            8,
        );

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SessionOutcome::Done { .. }));

        // Nothing dispatched, nothing recorded: the follow-up completion
        // carries no tool round at all
        assert!(mock.trace()[1].input_tool_history.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_invocation_keeps_wire_blocks_paired() {
        use crate::ai::types::{ClaudeContentBlock, ClaudeMessageContent};
        use crate::ai::ClaudeClient;

        let tools = Arc::new(ToolRegistry::new());
        tools.register(StubTool::new("lookup", "42"));

        let (orchestrator, mock) = orchestrator(
            vec![
                Ok(AiResponse::with_tools(
                    String::new(),
                    vec![
                        ToolCall {
                            id: "call_bad".to_string(),
                            name: "".to_string(),
                            arguments: json!({}),
                        },
                        ToolCall {
                            id: "call_good".to_string(),
                            name: "lookup".to_string(),
                            arguments: json!({}),
                        },
                    ],
                )),
                Ok(AiResponse::text("done".to_string())),
            ],
            tools,
            8,
        );

        orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;

        // Render the recorded round exactly as the real client does: every
        // tool_use block must have a matching tool_result block
        let history = &mock.trace()[1].input_tool_history[0];
        let messages =
            ClaudeClient::build_tool_result_messages(&history.tool_calls, &history.tool_responses);

        let mut tool_uses = Vec::new();
        let mut tool_results = Vec::new();
        for message in &messages {
            if let ClaudeMessageContent::Blocks(blocks) = &message.content {
                for block in blocks {
                    match block {
                        ClaudeContentBlock::ToolUse { id, .. } => tool_uses.push(id.clone()),
                        ClaudeContentBlock::ToolResult { tool_use_id, .. } => {
                            tool_results.push(tool_use_id.clone())
                        }
                        ClaudeContentBlock::Text { .. } => {}
                    }
                }
            }
        }

        assert_eq!(tool_uses, vec!["call_good"]);
        assert_eq!(tool_results, vec!["call_good"]);
    }

    #[tokio::test]
    async fn test_exhaustion_at_iteration_bound() {
        let tools = Arc::new(ToolRegistry::new());
        tools.register(StubTool::new("lookup", "42"));

        let tool_round = || {
            Ok(AiResponse::with_tools(
                String::new(),
                vec![ToolCall {
                    id: "call".to_string(),
                    name: "lookup".to_string(),
                    arguments: json!({}),
                }],
            ))
        };

        let (orchestrator, mock) =
            orchestrator(vec![tool_round(), tool_round(), tool_round()], tools, 2);

        let outcome = orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SessionOutcome::Exhausted));
        // Two executed rounds plus the completion that asked for a third
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token() {
        let (orchestrator, mock) = orchestrator(
            vec![Ok(AiResponse::text("never sent".to_string()))],
            Arc::new(ToolRegistry::new()),
            8,
        );

        let token = CancellationToken::new();
        token.cancel();

        let outcome = orchestrator.run(&window(), &context(), &token).await;
        assert!(matches!(outcome, SessionOutcome::Cancelled));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_during_completion() {
        let mock = MockAiClient::new(vec![Ok(AiResponse::text("late".to_string()))])
            .with_delay(Duration::from_millis(200));
        let orchestrator = GenerationOrchestrator::new(
            Arc::new(AiClient::Mock(mock.clone())),
            Arc::new(ToolRegistry::new()),
            "Banter",
            8,
        );

        let token = CancellationToken::new();
        let cancel_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_token.cancel();
        });

        let outcome = orchestrator.run(&window(), &context(), &token).await;
        assert!(matches!(outcome, SessionOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_long_tool_output_truncated_for_model() {
        let long_output = "x".repeat(TOOL_RESULT_MAX_CHARS + 500);
        let tools = Arc::new(ToolRegistry::new());
        tools.register(StubTool::new("dump", &long_output));

        let (orchestrator, mock) = orchestrator(
            vec![
                Ok(AiResponse::with_tools(
                    String::new(),
                    vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "dump".to_string(),
                        arguments: json!({}),
                    }],
                )),
                Ok(AiResponse::text("done".to_string())),
            ],
            tools,
            8,
        );

        orchestrator
            .run(&window(), &context(), &CancellationToken::new())
            .await;

        let responses = &mock.trace()[1].input_tool_history[0].tool_responses;
        let content = &responses[0].content;
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            content.chars().count(),
            TOOL_RESULT_MAX_CHARS + TRUNCATION_MARKER.chars().count()
        );
    }

    #[test]
    fn test_truncate_boundary() {
        let exact = "a".repeat(TOOL_RESULT_MAX_CHARS);
        assert_eq!(truncate_for_model(&exact), exact);

        let over = "a".repeat(TOOL_RESULT_MAX_CHARS + 1);
        assert!(truncate_for_model(&over).ends_with(TRUNCATION_MARKER));
    }
}
