//! Prompt templates for the agent actions.

use super::state::{AgentState, TodoItem};
use crate::tools::ToolRegistry;

/// Build the system prompt, listing the tools the model may call.
pub fn build_system_prompt(tools: Option<&ToolRegistry>) -> String {
    let tool_section = match tools {
        Some(tools) if !tools.is_empty() => {
            let descriptions = tools
                .definitions()
                .map(|t| format!("- **{}**: {}", t.name, t.description))
                .collect::<Vec<_>>()
                .join("\n");
            format!(
                "\n\n## Tools\n\nYou may call these tools when they help:\n{}\n\nUse web_search and web_crawl to look up APIs you are unsure about. Use code_runner to check small snippets before relying on them.",
                descriptions
            )
        }
        _ => String::new(),
    };

    format!(
        r#"You are a careful coding assistant. You analyze a coding request, plan the work, and write clean, working code.

## Rules

1. **Be concrete** - Name the language, inputs, outputs and edge cases.
2. **Verify when you can** - Prefer facts from tools over guesses.
3. **Stay focused** - Only produce what the request asks for.{tool_section}"#,
        tool_section = tool_section
    )
}

pub fn analysis_prompt(request: &str) -> String {
    format!(
        r#"Analyze the following coding request and provide a detailed breakdown:

Request: "{request}"

Please provide:
1. What type of code needs to be created (function, class, script, etc.)
2. Key requirements and constraints
3. Input/output specifications
4. Any edge cases to consider
5. Technology stack or language specifics

Provide a clear, concise analysis that will help in creating a todo list and generating code."#
    )
}

pub fn todo_prompt(state: &AgentState) -> String {
    format!(
        r#"Based on this analysis and user request, create a todo list.

Analysis: {analysis}
User Request: "{request}"

Create specific, actionable tasks, ordered logically, each with a priority of high, medium or low.

Respond with only a JSON array, for example:
[{{"description": "Parse the input file", "priority": "high"}}]"#,
        analysis = state.analysis.as_deref().unwrap_or("(none)"),
        request = state.user_request,
    )
}

pub fn code_prompt(state: &AgentState, research: Option<&str>) -> String {
    let todos = format_todos(&state.todo_list);
    let research = research
        .filter(|r| !r.trim().is_empty())
        .map(|r| format!("\nResearch notes:\n{}\n", r))
        .unwrap_or_default();

    format!(
        r#"Generate code based on the following requirements:

User Request: "{request}"

Analysis: {analysis}

Todo Items:
{todos}
{research}
Generate clean, well-documented code that fulfills the requirements. Include:
1. Clear function/class definitions
2. Proper error handling
3. Docstrings and comments
4. Example usage if appropriate

Return only the code in a single fenced code block."#,
        request = state.user_request,
        analysis = state.analysis.as_deref().unwrap_or("(none)"),
    )
}

fn format_todos(todos: &[TodoItem]) -> String {
    if todos.is_empty() {
        return "- (none)".to_string();
    }
    todos
        .iter()
        .map(|t| format!("- [{}] {}", t.priority, t.description))
        .collect::<Vec<_>>()
        .join("\n")
}
