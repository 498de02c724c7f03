//! Tools the model may call mid-conversation.
//!
//! Built-in tools:
//! - `web_search`: search the web, returns `[{title, url, snippet}]`
//! - `web_crawl`: fetch a page and reduce it to plain text
//! - `code_runner`: run a python or javascript snippet with a short timeout

mod code_runner;
mod registry;
mod web;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use code_runner::{CodeRunner, Language, RunOutput};
pub use registry::{
    BlockingFn, ToolCallResult, ToolDefinition, ToolHandler, ToolRegistry, ToolSchema,
};
pub use web::{SearchResult, WebCrawl, WebPage, WebSearch};

/// Failure of a single tool execution.
///
/// These are recovered by the tool-use loop and reported to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("code execution timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("process exited with {}: {stderr}", describe_exit(.exit_code))]
    Runtime {
        exit_code: Option<i32>,
        stderr: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {}", c),
        None => "signal".to_string(),
    }
}

/// A tool implementation that suspends while it runs.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name advertised to the model.
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// Identifier of the tools shipped with the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinTool {
    WebSearch,
    WebCrawl,
    CodeRunner,
}

impl BuiltinTool {
    pub const ALL: [BuiltinTool; 3] = [Self::WebSearch, Self::WebCrawl, Self::CodeRunner];

    pub fn name(self) -> &'static str {
        match self {
            Self::WebSearch => "web_search",
            Self::WebCrawl => "web_crawl",
            Self::CodeRunner => "code_runner",
        }
    }
}

impl fmt::Display for BuiltinTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decode a tool's argument object into its typed form.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    if !args.is_object() {
        return Err(ToolError::InvalidArguments(
            "expected a JSON object".to_string(),
        ));
    }
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
