//! HTTP client for OpenAI-compatible chat-completion endpoints.
//!
//! Works with OpenAI itself and with compatible providers such as Moonshot (Kimi).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ChatMessage, ChatResponse, LlmClient, LlmError, ToolCall, Usage};
use crate::config::ProviderConfig;
use crate::tools::ToolSchema;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSchema]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Client for `POST {base_url}/chat/completions` with bearer auth.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(provider: &ProviderConfig) -> Self {
        Self::new(provider.base_url.clone(), provider.api_key.clone())
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

/// Decode a completion body into the first choice.
fn parse_completion(body: &str) -> Result<ChatResponse, LlmError> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::InvalidResponse(format!("failed to parse response: {}", e)))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

    Ok(ChatResponse {
        content: choice.message.content,
        tool_calls: choice.message.tool_calls,
        finish_reason: choice.finish_reason,
        usage: parsed.usage,
    })
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    async fn chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        tools: Option<&[ToolSchema]>,
        max_tokens: u32,
    ) -> Result<ChatResponse, LlmError> {
        let tools = tools.filter(|t| !t.is_empty());
        let request = CompletionRequest {
            model,
            messages,
            tools,
            tool_choice: tools.map(|_| "auto"),
            max_tokens,
        };

        tracing::debug!(
            "Requesting completion from {} (model={}, messages={}, tools={})",
            self.base_url,
            model,
            messages.len(),
            tools.map_or(0, |t| t.len())
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        if status >= 400 {
            return Err(LlmError::Api {
                status,
                message: body,
            });
        }

        let parsed = parse_completion(&body)?;
        if let Some(usage) = &parsed.usage {
            tracing::debug!(
                "Completion used {} prompt / {} completion tokens",
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        Ok(parsed)
    }
}
