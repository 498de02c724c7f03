//! Bounded tool-calling loop between the model and the tool registry.

use serde::{Deserialize, Serialize};

use crate::llm::{ChatMessage, LlmClient, LlmError, ModelTurn, ToolCallRequest};
use crate::tools::{ToolCallResult, ToolRegistry, ToolSchema};

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model produced a final answer.
    EndTurn,
    /// The iteration cap was hit while the model still wanted tools.
    ToolLimitReached,
}

/// Result of [`ToolLoop::generate_with_tools`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolLoopOutput {
    pub content: String,
    pub tool_calls: Vec<ToolCallResult>,
    pub stop_reason: StopReason,
}

enum LoopState {
    AwaitingModel,
    ExecutingTools {
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
    Done(String),
}

/// Runs one conversation against a model with the tools of a registry.
pub struct ToolLoop<'a> {
    llm: &'a dyn LlmClient,
    tools: &'a ToolRegistry,
    model: &'a str,
    max_tokens: u32,
    max_iterations: usize,
}

impl<'a> ToolLoop<'a> {
    pub fn new(llm: &'a dyn LlmClient, tools: &'a ToolRegistry, model: &'a str) -> Self {
        Self {
            llm,
            tools,
            model,
            max_tokens: 4000,
            max_iterations: 5,
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Ask the model, run whatever tools it requests, and repeat.
    ///
    /// At most `max_iterations` model calls are made. Each executed tool call
    /// appends exactly two messages to the history: the assistant turn
    /// carrying that call and the tool result. Text the model sent with its
    /// calls is kept on the first of those assistant turns. Tool failures are reported to
    /// the model; provider errors abort the loop.
    pub async fn generate_with_tools(
        &self,
        mut messages: Vec<ChatMessage>,
    ) -> Result<ToolLoopOutput, LlmError> {
        let schemas: Vec<ToolSchema> = self.tools.list_definitions().collect();
        let schemas = (!schemas.is_empty()).then_some(schemas.as_slice());

        let mut tool_calls = Vec::new();
        let mut last_text: Option<String> = None;
        let mut iterations = 0;
        let mut state = LoopState::AwaitingModel;

        loop {
            state = match state {
                LoopState::AwaitingModel => {
                    if iterations >= self.max_iterations {
                        tracing::warn!(
                            "Tool loop hit the iteration cap ({}) without a final answer",
                            self.max_iterations
                        );
                        let content = last_text.unwrap_or_else(|| {
                            format!(
                                "Max iterations ({}) reached without final answer",
                                self.max_iterations
                            )
                        });
                        return Ok(ToolLoopOutput {
                            content,
                            tool_calls,
                            stop_reason: StopReason::ToolLimitReached,
                        });
                    }
                    iterations += 1;
                    tracing::debug!("Tool loop iteration {}", iterations);

                    let response = self
                        .llm
                        .chat_completion(self.model, &messages, schemas, self.max_tokens)
                        .await?;

                    match response.into_turn() {
                        ModelTurn::FinalAnswer(text) => LoopState::Done(text),
                        ModelTurn::ToolRequests { text, calls } => {
                            if text.is_some() {
                                last_text.clone_from(&text);
                            }
                            LoopState::ExecutingTools { text, calls }
                        }
                    }
                }
                LoopState::ExecutingTools { mut text, calls } => {
                    for request in calls {
                        tracing::info!(
                            "Calling tool: {} with args: {}",
                            request.name,
                            request.arguments
                        );
                        let result = self.tools.execute_request(&request).await;

                        // Text sent with the calls rides on the first assistant message.
                        messages.push(ChatMessage::tool_request(
                            text.take(),
                            vec![request.to_call()],
                        ));
                        messages.push(ChatMessage::tool_result(
                            request.id.clone(),
                            result.to_message_content(),
                        ));
                        tool_calls.push(result);
                    }
                    LoopState::AwaitingModel
                }
                LoopState::Done(content) => {
                    return Ok(ToolLoopOutput {
                        content,
                        tool_calls,
                        stop_reason: StopReason::EndTurn,
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{self, Exhausted, MockLlm};
    use crate::llm::Role;
    use crate::tools::ToolError;
    use serde_json::{json, Value};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register_blocking(
            "add",
            "Add two integers",
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "integer"},
                    "b": {"type": "integer"}
                },
                "required": ["a", "b"]
            }),
            |args: Value| {
                let a = args["a"].as_i64();
                let b = args["b"].as_i64();
                match (a, b) {
                    (Some(a), Some(b)) => Ok(json!(a + b)),
                    _ => Err(ToolError::InvalidArguments("a and b must be integers".into())),
                }
            },
        );
        registry
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::system("You can add numbers."),
            ChatMessage::user("What is 2 + 3?"),
        ]
    }

    #[tokio::test]
    async fn immediate_answer_makes_no_tool_calls() {
        let llm = MockLlm::answering("5");
        let tools = registry();

        let output = ToolLoop::new(&llm, &tools, "test-model")
            .generate_with_tools(conversation())
            .await
            .unwrap();

        assert_eq!(output.content, "5");
        assert!(output.tool_calls.is_empty());
        assert_eq!(output.stop_reason, StopReason::EndTurn);
        assert_eq!(llm.calls(), 1);
        assert_eq!(llm.observed()[0].tool_names, vec!["add"]);
    }

    #[tokio::test]
    async fn tool_result_is_fed_back() {
        let llm = MockLlm::new(
            vec![
                mock::tool_calls(&[("call_1", "add", r#"{"a":2,"b":3}"#)]),
                mock::text("2 + 3 = 5"),
            ],
            Exhausted::Answer("unreachable".into()),
        );
        let tools = registry();

        let output = ToolLoop::new(&llm, &tools, "test-model")
            .generate_with_tools(conversation())
            .await
            .unwrap();

        assert_eq!(output.content, "2 + 3 = 5");
        assert_eq!(output.stop_reason, StopReason::EndTurn);
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].result, Some(json!(5)));
        assert_eq!(output.tool_calls[0].input, json!({"a": 2, "b": 3}));

        let second = &llm.observed()[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[2].role, Role::Assistant);
        assert_eq!(second[2].tool_calls.as_ref().unwrap()[0].id, "call_1");
        assert_eq!(second[3].role, Role::Tool);
        assert_eq!(second[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(second[3].content.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn history_grows_by_two_per_call_with_parallel_requests() {
        let llm = MockLlm::new(
            vec![
                mock::tool_calls(&[
                    ("c1", "add", r#"{"a":1,"b":1}"#),
                    ("c2", "add", r#"{"a":2,"b":2}"#),
                    ("c3", "missing_tool", "{}"),
                ]),
                mock::text("done"),
            ],
            Exhausted::Answer("unreachable".into()),
        );
        let tools = registry();

        let output = ToolLoop::new(&llm, &tools, "m")
            .generate_with_tools(conversation())
            .await
            .unwrap();

        assert_eq!(output.tool_calls.len(), 3);
        assert_eq!(output.tool_calls[2].error.as_deref(), Some("unknown tool: missing_tool"));
        let observed = llm.observed();
        assert_eq!(observed[1].messages.len(), conversation().len() + 2 * 3);
        assert_eq!(
            observed[1].messages.last().unwrap().content.as_deref(),
            Some("Error: unknown tool: missing_tool")
        );
    }

    #[tokio::test]
    async fn always_calling_model_hits_the_cap() {
        let llm = MockLlm::always_calling("add", r#"{"a":1,"b":2}"#);
        let tools = registry();

        let output = ToolLoop::new(&llm, &tools, "m")
            .max_iterations(3)
            .generate_with_tools(conversation())
            .await
            .unwrap();

        assert_eq!(output.stop_reason, StopReason::ToolLimitReached);
        assert_eq!(output.tool_calls.len(), 3);
        assert_eq!(llm.calls(), 3);
        assert_eq!(output.content, "Max iterations (3) reached without final answer");
    }

    #[tokio::test]
    async fn default_cap_is_five() {
        let llm = MockLlm::always_calling("add", r#"{"a":1,"b":2}"#);
        let tools = registry();

        let output = ToolLoop::new(&llm, &tools, "m")
            .generate_with_tools(conversation())
            .await
            .unwrap();

        assert_eq!(output.tool_calls.len(), 5);
        assert_eq!(llm.calls(), 5);
    }

    #[tokio::test]
    async fn cap_returns_last_assistant_text() {
        let mut with_text = mock::tool_calls(&[("c1", "add", r#"{"a":1,"b":2}"#)]);
        with_text.content = Some("Let me add those.".to_string());
        let llm = MockLlm::new(
            vec![with_text],
            Exhausted::RepeatTool {
                name: "add".into(),
                arguments: r#"{"a":1,"b":2}"#.into(),
            },
        );
        let tools = registry();

        let output = ToolLoop::new(&llm, &tools, "m")
            .max_iterations(2)
            .generate_with_tools(conversation())
            .await
            .unwrap();

        assert_eq!(output.stop_reason, StopReason::ToolLimitReached);
        assert_eq!(output.content, "Let me add those.");
    }

    #[tokio::test]
    async fn text_with_tool_calls_stays_in_history() {
        let mut with_text = mock::tool_calls(&[
            ("c1", "add", r#"{"a":1,"b":2}"#),
            ("c2", "add", r#"{"a":3,"b":4}"#),
        ]);
        with_text.content = Some("Adding both pairs.".to_string());
        let llm = MockLlm::new(
            vec![with_text, mock::text("3 and 7")],
            Exhausted::Answer("unreachable".into()),
        );
        let tools = registry();

        ToolLoop::new(&llm, &tools, "m")
            .generate_with_tools(conversation())
            .await
            .unwrap();

        let history = &llm.observed()[1].messages;
        assert_eq!(history.len(), 6);
        assert_eq!(history[2].content.as_deref(), Some("Adding both pairs."));
        assert_eq!(history[4].role, Role::Assistant);
        assert!(history[4].content.is_none());
    }

    #[tokio::test]
    async fn tool_errors_are_reported_not_raised() {
        let llm = MockLlm::new(
            vec![
                mock::tool_calls(&[("c1", "add", "{broken")]),
                mock::text("sorry"),
            ],
            Exhausted::Answer("unreachable".into()),
        );
        let tools = registry();

        let output = ToolLoop::new(&llm, &tools, "m")
            .generate_with_tools(conversation())
            .await
            .unwrap();

        assert!(output.tool_calls[0].is_error());
        assert_eq!(output.tool_calls[0].input, Value::Null);
    }

    #[tokio::test]
    async fn provider_error_aborts() {
        let llm = MockLlm::failing();
        let tools = registry();

        let err = ToolLoop::new(&llm, &tools, "m")
            .generate_with_tools(conversation())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api { status: 500, .. }));
    }

    #[tokio::test]
    async fn empty_registry_sends_no_tools() {
        let llm = MockLlm::answering("plain");
        let tools = ToolRegistry::new();

        let output = ToolLoop::new(&llm, &tools, "m")
            .generate_with_tools(conversation())
            .await
            .unwrap();
        assert_eq!(output.content, "plain");
        assert!(llm.observed()[0].tool_names.is_empty());
    }
}
