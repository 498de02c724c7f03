//! LLM client: chat messages, tool calls and the provider trait.

mod openai;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::tools::ToolSchema;

pub use openai::OpenAiCompatibleClient;

/// Errors from the remote model endpoint.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Assistant turn requesting tool calls.
    pub fn tool_request(content: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Result of the call identified by `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A tool call as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object.
    #[serde(default)]
    pub arguments: String,
}

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// The assistant message of one completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

/// A tool invocation requested by the model, with decoded arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Decode a wire call. Malformed argument JSON becomes `null`, which every tool rejects.
    pub fn from_call(call: &ToolCall) -> Self {
        let arguments = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                tracing::warn!(
                    "Unparseable arguments for tool {}: {}",
                    call.function.name,
                    e
                );
                Value::Null
            })
        };

        Self {
            id: call.id.clone(),
            name: call.function.name.clone(),
            arguments,
        }
    }

    /// Wire form, used to echo the call back in the history.
    pub fn to_call(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone(),
            kind: function_kind(),
            function: FunctionCall {
                name: self.name.clone(),
                arguments: self.arguments.to_string(),
            },
        }
    }
}

/// What the model decided to do this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTurn {
    FinalAnswer(String),
    ToolRequests {
        /// Text the model emitted alongside the calls, if any.
        text: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
}

impl ChatResponse {
    /// Classify the response. Any non-empty list of tool calls wins over text.
    pub fn into_turn(self) -> ModelTurn {
        let text = self.content.filter(|c| !c.trim().is_empty());
        match self.tool_calls {
            Some(calls) if !calls.is_empty() => ModelTurn::ToolRequests {
                text,
                calls: calls.iter().map(ToolCallRequest::from_call).collect(),
            },
            _ => ModelTurn::FinalAnswer(text.unwrap_or_default()),
        }
    }
}

/// A chat-completion endpoint that understands function calling.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
        max_tokens: u32,
    ) -> Result<ChatResponse, LlmError>;
}
