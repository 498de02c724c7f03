//! The analyze, plan and generate actions driven by the agent loop.

use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use super::fallback::{FallbackStrategy, TemplateFallback};
use super::prompt::{analysis_prompt, build_system_prompt, code_prompt, todo_prompt};
use super::state::{AgentState, Priority, Research, SearchEntry, TodoItem};
use super::tool_loop::{StopReason, ToolLoop};
use crate::config::Config;
use crate::llm::{ChatMessage, LlmClient, ModelTurn, OpenAiCompatibleClient};
use crate::tools::{ToolCallResult, ToolRegistry, WebSearch};

/// Characters of research notes passed into later prompts.
const RESEARCH_PROMPT_CHARS: usize = 6000;

/// What an action produced. The loop applies it to the state.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutput {
    Analysis { text: String, research: Research },
    Plan(Vec<TodoItem>),
    Code(String),
}

/// One step of the agent state loop.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, state: &AgentState) -> anyhow::Result<ActionOutput>;
}

/// Model names and limits used by the actions.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub fast_model: String,
    pub max_tokens: u32,
    pub max_iterations: usize,
}

/// Everything the actions share.
#[derive(Clone)]
pub struct ActionContext {
    pub llm: Option<Arc<dyn LlmClient>>,
    pub models: ModelSettings,
    /// Tools offered to the model; `None` disables tool use.
    pub tools: Option<Arc<ToolRegistry>>,
    /// Direct search used when web search is on but no model is configured.
    pub search: Option<Arc<WebSearch>>,
    pub fallback: Arc<dyn FallbackStrategy>,
}

impl ActionContext {
    /// Build the shared context from the startup configuration.
    pub fn from_config(config: &Config) -> Self {
        let llm = config.provider.as_ref().map(|p| {
            tracing::info!("Using {:?} provider at {} (model={})", p.kind, p.base_url, p.model);
            Arc::new(OpenAiCompatibleClient::from_config(p)) as Arc<dyn LlmClient>
        });

        let models = match &config.provider {
            Some(p) => ModelSettings {
                model: p.model.clone(),
                fast_model: p.fast_model.clone(),
                max_tokens: config.max_tokens,
                max_iterations: config.max_iterations,
            },
            None => ModelSettings {
                model: String::new(),
                fast_model: String::new(),
                max_tokens: config.max_tokens,
                max_iterations: config.max_iterations,
            },
        };

        let (tools, search) = if config.web_search {
            (
                Some(Arc::new(ToolRegistry::with_builtins(&config.tools))),
                Some(Arc::new(WebSearch::new(&config.tools.search_url))),
            )
        } else {
            (None, None)
        };

        Self {
            llm,
            models,
            tools,
            search,
            fallback: Arc::new(TemplateFallback),
        }
    }

    /// Context with no model and no tools.
    pub fn offline() -> Self {
        Self {
            llm: None,
            models: ModelSettings {
                model: String::new(),
                fast_model: String::new(),
                max_tokens: 4000,
                max_iterations: 5,
            },
            tools: None,
            search: None,
            fallback: Arc::new(TemplateFallback),
        }
    }

    /// Ask `model` once, through the tool loop when tools are enabled.
    ///
    /// If the tool loop runs out of iterations, the gathered results are
    /// handed back in one last request without tools.
    async fn ask(
        &self,
        llm: &dyn LlmClient,
        model: &str,
        prompt: String,
        use_tools: bool,
    ) -> anyhow::Result<(String, Vec<ToolCallResult>)> {
        let tools = self.tools.as_deref().filter(|_| use_tools);
        let messages = vec![
            ChatMessage::system(build_system_prompt(tools)),
            ChatMessage::user(prompt.clone()),
        ];

        let Some(tools) = tools else {
            return Ok((self.ask_plain(llm, model, messages).await?, Vec::new()));
        };

        let output = ToolLoop::new(llm, tools, model)
            .max_tokens(self.models.max_tokens)
            .max_iterations(self.models.max_iterations)
            .generate_with_tools(messages)
            .await?;

        match output.stop_reason {
            StopReason::EndTurn => Ok((output.content, output.tool_calls)),
            StopReason::ToolLimitReached => {
                tracing::warn!("Tool budget exhausted, asking for a final answer without tools");
                let notes = Research {
                    tool_calls: output.tool_calls.clone(),
                    searches: Vec::new(),
                }
                .summary(RESEARCH_PROMPT_CHARS);
                let messages = vec![
                    ChatMessage::system(build_system_prompt(None)),
                    ChatMessage::user(format!(
                        "{}\n\nTool results gathered so far:\n{}\nAnswer now without calling tools.",
                        prompt, notes
                    )),
                ];
                let text = self.ask_plain(llm, model, messages).await?;
                Ok((text, output.tool_calls))
            }
        }
    }

    async fn ask_plain(
        &self,
        llm: &dyn LlmClient,
        model: &str,
        messages: Vec<ChatMessage>,
    ) -> anyhow::Result<String> {
        let response = llm
            .chat_completion(model, &messages, None, self.models.max_tokens)
            .await?;
        match response.into_turn() {
            ModelTurn::FinalAnswer(text) => Ok(text),
            ModelTurn::ToolRequests { text: Some(text), .. } => Ok(text),
            ModelTurn::ToolRequests { text: None, .. } => {
                Err(anyhow!("model requested tools when none were offered"))
            }
        }
    }

    /// Searches made without a model, one entry per query.
    async fn direct_search(&self, search: &WebSearch, request: &str) -> Vec<SearchEntry> {
        let mut entries = Vec::new();
        for query in search_queries(request) {
            let entry = match search.search(&query, 3).await {
                Ok(results) => SearchEntry {
                    query,
                    results,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!("Search for '{}' failed: {}", query, e);
                    SearchEntry {
                        query,
                        results: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            entries.push(entry);
        }
        entries
    }
}

fn search_queries(request: &str) -> Vec<String> {
    let mut queries = vec![
        format!("how to implement {} example", request),
        format!("best practices {}", request),
    ];
    queries.dedup();
    queries.truncate(3);
    queries
}

/// Analyze the user's coding request.
pub struct AnalyzeRequirement {
    ctx: Arc<ActionContext>,
}

impl AnalyzeRequirement {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for AnalyzeRequirement {
    fn name(&self) -> &'static str {
        "analyze_requirement"
    }

    async fn execute(&self, state: &AgentState) -> anyhow::Result<ActionOutput> {
        let request = state.user_request.as_str();

        let Some(llm) = self.ctx.llm.as_deref() else {
            let mut research = Research::default();
            if let Some(search) = self.ctx.search.as_deref() {
                research.searches = self.ctx.direct_search(search, request).await;
            }
            return Ok(ActionOutput::Analysis {
                text: self.ctx.fallback.analyze(request),
                research,
            });
        };

        let (text, tool_calls) = self
            .ctx
            .ask(llm, &self.ctx.models.fast_model, analysis_prompt(request), true)
            .await?;
        if text.trim().is_empty() {
            bail!("model returned an empty analysis");
        }

        Ok(ActionOutput::Analysis {
            text,
            research: Research {
                tool_calls,
                searches: Vec::new(),
            },
        })
    }
}

/// Turn the analysis into a todo list.
pub struct CreateTodo {
    ctx: Arc<ActionContext>,
}

impl CreateTodo {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for CreateTodo {
    fn name(&self) -> &'static str {
        "create_todo"
    }

    async fn execute(&self, state: &AgentState) -> anyhow::Result<ActionOutput> {
        let Some(llm) = self.ctx.llm.as_deref() else {
            return Ok(ActionOutput::Plan(self.ctx.fallback.plan(&state.user_request)));
        };

        let (text, _) = self
            .ctx
            .ask(llm, &self.ctx.models.fast_model, todo_prompt(state), false)
            .await?;
        let plan = parse_plan(&text);
        if plan.is_empty() {
            bail!("model returned an empty plan");
        }
        Ok(ActionOutput::Plan(plan))
    }
}

/// Generate the code.
pub struct GenerateCode {
    ctx: Arc<ActionContext>,
}

impl GenerateCode {
    pub fn new(ctx: Arc<ActionContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Action for GenerateCode {
    fn name(&self) -> &'static str {
        "generate_code"
    }

    async fn execute(&self, state: &AgentState) -> anyhow::Result<ActionOutput> {
        let Some(llm) = self.ctx.llm.as_deref() else {
            let code = self.ctx.fallback.generate(
                &state.user_request,
                state.analysis.as_deref().unwrap_or_default(),
                &state.todo_list,
            );
            return Ok(ActionOutput::Code(code));
        };

        let research = (!state.research.is_empty())
            .then(|| state.research.summary(RESEARCH_PROMPT_CHARS));
        let (text, _) = self
            .ctx
            .ask(
                llm,
                &self.ctx.models.model,
                code_prompt(state, research.as_deref()),
                true,
            )
            .await?;

        let code = extract_code_block(&text);
        if code.trim().is_empty() {
            bail!("model returned no code");
        }
        Ok(ActionOutput::Code(code))
    }
}

#[derive(Deserialize)]
struct PlanEntry {
    #[serde(alias = "content", alias = "task", alias = "title")]
    description: String,
    #[serde(default)]
    priority: Option<String>,
}

/// Parse a plan from model output.
///
/// Accepts a JSON array in a fenced block or embedded in prose or, failing
/// that, a bulleted or numbered list.
fn parse_plan(text: &str) -> Vec<TodoItem> {
    if let Some(entries) = find_plan_json(text) {
        return entries
            .into_iter()
            .filter(|e| !e.description.trim().is_empty())
            .map(|e| {
                let priority = e
                    .priority
                    .as_deref()
                    .map_or(Priority::Medium, Priority::parse_lenient);
                TodoItem::new(e.description.trim(), priority)
            })
            .collect();
    }

    let Ok(bullet) = Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(?:\[(\w+)\]\s*)?(.+?)\s*$") else {
        return Vec::new();
    };
    text.lines()
        .filter_map(|line| bullet.captures(line))
        .map(|c| {
            let priority = c
                .get(1)
                .map_or(Priority::Medium, |m| Priority::parse_lenient(m.as_str()));
            TodoItem::new(&c[2], priority)
        })
        .collect()
}

/// First non-empty JSON plan array: fenced blocks first, then each `[` in the text.
fn find_plan_json(text: &str) -> Option<Vec<PlanEntry>> {
    let first_array = |candidate: &str| {
        serde_json::Deserializer::from_str(candidate)
            .into_iter::<Vec<PlanEntry>>()
            .next()
            .and_then(Result::ok)
            .filter(|entries| !entries.is_empty())
    };

    if let Ok(fence) = Regex::new(r"(?s)```[\w-]*[^\n]*\n(.*?)```") {
        let fenced = fence
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .find_map(|m| first_array(m.as_str().trim()));
        if fenced.is_some() {
            return fenced;
        }
    }

    text.match_indices('[')
        .find_map(|(start, _)| first_array(&text[start..]))
}

/// Pull the first fenced code block out of a reply, or the whole reply if there is none.
fn extract_code_block(text: &str) -> String {
    let fenced = Regex::new(r"(?s)```[\w+#.-]*[^\n]*\n(.*?)```")
        .ok()
        .and_then(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str().to_string());

    match fenced {
        Some(code) => code.trim_end().to_string() + "\n",
        None => text.trim().to_string(),
    }
}
