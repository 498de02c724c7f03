//! Agent state carried through the analyze / plan / generate stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tools::{SearchResult, ToolCallResult};

/// Stage of the agent state loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Analyzed,
    Planned,
    Completed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Planned => write!(f, "planned"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Lenient parse used on model output. Unknown values map to `Medium`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "high" | "h" | "critical" => Self::High,
            "low" | "l" => Self::Low,
            _ => Self::Medium,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    Completed,
}

/// One planned step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub description: String,
    pub priority: Priority,
    pub status: TodoStatus,
}

impl TodoItem {
    /// New pending item with a short random id.
    pub fn new(description: impl Into<String>, priority: Priority) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self {
            id,
            description: description.into(),
            priority,
            status: TodoStatus::Pending,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TodoStatus::Completed
    }
}

/// Results of one direct web search made while analyzing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntry {
    pub query: String,
    pub results: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Context gathered before planning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Research {
    /// Tool calls made by the model while analyzing.
    pub tool_calls: Vec<ToolCallResult>,
    /// Direct searches made without a model.
    pub searches: Vec<SearchEntry>,
}

impl Research {
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty() && self.searches.is_empty()
    }

    /// Compact text rendering for prompts.
    pub fn summary(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for entry in &self.searches {
            out.push_str(&format!("Search: {}\n", entry.query));
            for r in &entry.results {
                out.push_str(&format!("- {} ({}): {}\n", r.title, r.url, r.snippet));
            }
        }
        for call in &self.tool_calls {
            out.push_str(&format!(
                "Tool {} {} -> {}\n",
                call.name,
                call.input,
                call.to_message_content()
            ));
        }
        match out.char_indices().nth(max_chars) {
            Some((idx, _)) => out[..idx].to_string(),
            None => out,
        }
    }
}

/// Central state for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub user_request: String,
    pub stage: Stage,
    /// Stages entered so far, in order, starting with `Start`.
    pub visited: Vec<Stage>,
    pub analysis: Option<String>,
    pub todo_list: Vec<TodoItem>,
    pub generated_code: Option<String>,
    pub research: Research,
    /// Set when an action failed; the loop stops once this is present.
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AgentState {
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            stage: Stage::Start,
            visited: vec![Stage::Start],
            analysis: None,
            todo_list: Vec::new(),
            generated_code: None,
            research: Research::default(),
            failure: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        self.visited.push(stage);
        if stage == Stage::Completed {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn fail(&mut self, note: impl Into<String>) {
        self.failure = Some(note.into());
        self.finished_at = Some(Utc::now());
    }

    /// Completed or failed.
    pub fn is_terminal(&self) -> bool {
        self.stage == Stage::Completed || self.failure.is_some()
    }

    pub fn complete_all_tasks(&mut self) {
        for task in &mut self.todo_list {
            task.status = TodoStatus::Completed;
        }
    }
}
