//! Agent module - the request-to-code pipeline.
//!
//! A request moves through four stages:
//! 1. `start`: analyze the requirement (optionally researching with tools)
//! 2. `analyzed`: turn the analysis into a todo list
//! 3. `planned`: generate the code
//! 4. `completed`
//!
//! Model calls that may use tools go through [`ToolLoop`], which bounds the
//! number of round trips.

mod actions;
mod agentic_loop;
mod fallback;
mod prompt;
mod state;
mod tool_loop;

pub use actions::{
    Action, ActionContext, ActionOutput, AnalyzeRequirement, CreateTodo, GenerateCode,
    ModelSettings,
};
pub use agentic_loop::AgenticLoop;
pub use fallback::{FallbackStrategy, TemplateFallback};
pub use prompt::build_system_prompt;
pub use state::{AgentState, Priority, Research, SearchEntry, Stage, TodoItem, TodoStatus};
pub use tool_loop::{StopReason, ToolLoop, ToolLoopOutput};
