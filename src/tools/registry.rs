//! Tool registry and generic dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{BuiltinTool, CodeRunner, Tool, ToolError, WebCrawl, WebSearch};
use crate::config::ToolsConfig;
use crate::llm::ToolCallRequest;

/// A blocking tool body, called directly on the loop's task.
pub type BlockingFn = Arc<dyn Fn(Value) -> Result<Value, ToolError> + Send + Sync>;

/// How a registered tool is invoked. Fixed at registration time.
#[derive(Clone)]
pub enum ToolHandler {
    Blocking(BlockingFn),
    Suspending(Arc<dyn Tool>),
}

impl fmt::Debug for ToolHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocking(_) => f.write_str("Blocking(..)"),
            Self::Suspending(tool) => write!(f, "Suspending({})", tool.name()),
        }
    }
}

/// Name, description and argument schema of a registered tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool schema in the function-calling wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn to_schema(&self) -> ToolSchema {
        ToolSchema {
            kind: "function".to_string(),
            function: FunctionSchema {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }
}

/// Outcome of one executed tool call.
///
/// Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub name: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCallResult {
    fn from_outcome(name: &str, input: Value, outcome: Result<Value, ToolError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            name: name.to_string(),
            input,
            result,
            error,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Text handed back to the model as the tool message content.
    pub fn to_message_content(&self) -> String {
        match (&self.result, &self.error) {
            (_, Some(e)) => format!("Error: {}", e),
            (Some(Value::String(s)), None) => s.clone(),
            (Some(v), None) => v.to_string(),
            (None, None) => String::new(),
        }
    }
}

struct Entry {
    definition: ToolDefinition,
    handler: ToolHandler,
}

/// Ordered map from tool name to definition and handler.
///
/// Owned by a single conversation; share it read-only.
#[derive(Default)]
pub struct ToolRegistry {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in `web_search`, `web_crawl` and `code_runner` tools.
    pub fn with_builtins(config: &ToolsConfig) -> Self {
        let mut registry = Self::new();
        for tool in BuiltinTool::ALL {
            registry.register_builtin(tool, config);
        }
        registry
    }

    /// Register one built-in tool.
    pub fn register_builtin(&mut self, tool: BuiltinTool, config: &ToolsConfig) {
        match tool {
            BuiltinTool::WebSearch => self.register_tool(WebSearch::new(&config.search_url)),
            BuiltinTool::WebCrawl => self.register_tool(WebCrawl::new(
                config.crawl_timeout,
                config.crawl_text_limit,
            )),
            BuiltinTool::CodeRunner => self.register_tool(CodeRunner::new(config.code_timeout)),
        }
    }

    /// Store a tool, replacing any tool already registered under `name`.
    ///
    /// A replaced tool keeps its position in [`Self::list_definitions`].
    pub fn register(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: ToolHandler,
    ) {
        let name = name.into();
        let entry = Entry {
            definition: ToolDefinition {
                name: name.clone(),
                description: description.into(),
                parameters,
            },
            handler,
        };

        match self.index.get(&name).copied() {
            Some(i) => {
                tracing::debug!("Replacing tool {}", name);
                self.entries[i] = entry;
            }
            None => {
                self.index.insert(name, self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Register an async [`Tool`] implementation.
    pub fn register_tool<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        let description = tool.description().to_string();
        let parameters = tool.parameters_schema();
        self.register(name, description, parameters, ToolHandler::Suspending(Arc::new(tool)));
    }

    /// Register a blocking closure.
    pub fn register_blocking<F>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        f: F,
    ) where
        F: Fn(Value) -> Result<Value, ToolError> + Send + Sync + 'static,
    {
        self.register(name, description, parameters, ToolHandler::Blocking(Arc::new(f)));
    }

    /// Schemas to advertise to the model, in registration order.
    pub fn list_definitions(&self) -> impl Iterator<Item = ToolSchema> + '_ {
        self.entries.iter().map(|e| e.definition.to_schema())
    }

    /// Registered definitions, in registration order.
    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> + '_ {
        self.entries.iter().map(|e| &e.definition)
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Result<&ToolHandler, ToolError> {
        self.index
            .get(name)
            .map(|&i| &self.entries[i].handler)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run one tool and capture its outcome. Never retries.
    pub async fn execute(&self, name: &str, arguments: Value) -> ToolCallResult {
        let outcome = match self.get(name) {
            Ok(ToolHandler::Blocking(f)) => (f.as_ref())(arguments.clone()),
            Ok(ToolHandler::Suspending(tool)) => tool.execute(arguments.clone()).await,
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(_) => tracing::info!("Tool {} succeeded", name),
            Err(e) => tracing::warn!("Tool {} failed: {}", name, e),
        }

        ToolCallResult::from_outcome(name, arguments, outcome)
    }

    /// Run a parsed model request.
    pub async fn execute_request(&self, request: &ToolCallRequest) -> ToolCallResult {
        self.execute(&request.name, request.arguments.clone()).await
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| &e.definition.name))
            .finish()
    }
}
