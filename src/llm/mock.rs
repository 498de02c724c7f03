//! Scripted LLM client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ChatMessage, ChatResponse, FunctionCall, LlmClient, LlmError, ToolCall};
use crate::tools::ToolSchema;

/// What the mock does when its script runs out.
pub(crate) enum Exhausted {
    /// Keep requesting the same tool forever.
    RepeatTool { name: String, arguments: String },
    /// Answer with fixed text.
    Answer(String),
}

/// One observed request.
#[derive(Debug, Clone)]
pub(crate) struct Observed {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
}

pub(crate) struct MockLlm {
    script: Mutex<VecDeque<Result<ChatResponse, LlmError>>>,
    exhausted: Exhausted,
    observed: Mutex<Vec<Observed>>,
}

impl MockLlm {
    pub fn new(script: Vec<ChatResponse>, exhausted: Exhausted) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(Ok).collect()),
            exhausted,
            observed: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `text`.
    pub fn answering(text: &str) -> Self {
        Self::new(Vec::new(), Exhausted::Answer(text.to_string()))
    }

    /// Request `name` on every turn.
    pub fn always_calling(name: &str, arguments: &str) -> Self {
        Self::new(
            Vec::new(),
            Exhausted::RepeatTool {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        )
    }

    /// Fail the next request with a provider error.
    pub fn failing() -> Self {
        let mock = Self::answering("unused");
        mock.script
            .lock()
            .unwrap()
            .push_back(Err(LlmError::Api {
                status: 500,
                message: "upstream exploded".to_string(),
            }));
        mock
    }

    pub fn observed(&self) -> Vec<Observed> {
        self.observed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.observed.lock().unwrap().len()
    }
}

pub(crate) fn text(content: &str) -> ChatResponse {
    ChatResponse {
        content: Some(content.to_string()),
        finish_reason: Some("stop".to_string()),
        ..Default::default()
    }
}

pub(crate) fn tool_calls(calls: &[(&str, &str, &str)]) -> ChatResponse {
    ChatResponse {
        content: None,
        tool_calls: Some(
            calls
                .iter()
                .map(|(id, name, args)| ToolCall {
                    id: id.to_string(),
                    kind: "function".to_string(),
                    function: FunctionCall {
                        name: name.to_string(),
                        arguments: args.to_string(),
                    },
                })
                .collect(),
        ),
        finish_reason: Some("tool_calls".to_string()),
        usage: None,
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
        _max_tokens: u32,
    ) -> Result<ChatResponse, LlmError> {
        let turn = {
            let mut observed = self.observed.lock().unwrap();
            observed.push(Observed {
                model: model.to_string(),
                messages: messages.to_vec(),
                tool_names: tools
                    .unwrap_or_default()
                    .iter()
                    .map(|t| t.function.name.clone())
                    .collect(),
            });
            observed.len()
        };

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }

        Ok(match &self.exhausted {
            Exhausted::RepeatTool { name, arguments } => {
                let id = format!("call_{}", turn);
                tool_calls(&[(id.as_str(), name.as_str(), arguments.as_str())])
            }
            Exhausted::Answer(answer) => text(answer),
        })
    }
}
