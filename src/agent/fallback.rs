//! Last-resort generation used when no LLM provider is configured.

use super::state::{Priority, TodoItem};

/// Produces analysis, plan and code without a model.
pub trait FallbackStrategy: Send + Sync {
    fn analyze(&self, request: &str) -> String;

    fn plan(&self, request: &str) -> Vec<TodoItem>;

    fn generate(&self, request: &str, analysis: &str, plan: &[TodoItem]) -> String;
}

/// Template-based fallback producing a generic plan and a Python skeleton.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateFallback;

impl FallbackStrategy for TemplateFallback {
    fn analyze(&self, request: &str) -> String {
        format!(
            r#"Basic analysis of request: "{request}"

The user wants code to be generated based on their requirements. This requires:
1. Understanding the specific coding task
2. Creating a plan with actionable steps
3. Generating clean, functional code
4. Ensuring the code meets user expectations

Next step: Create a detailed todo list with specific tasks to accomplish this goal."#
        )
    }

    fn plan(&self, request: &str) -> Vec<TodoItem> {
        let short: String = request.chars().take(50).collect();
        let suffix = if request.chars().count() > 50 { "..." } else { "" };
        vec![
            TodoItem::new("Analyze and understand the requirements", Priority::High),
            TodoItem::new(
                format!("Create implementation for: {}{}", short, suffix),
                Priority::High,
            ),
            TodoItem::new("Test and validate the generated code", Priority::Medium),
        ]
    }

    fn generate(&self, request: &str, _analysis: &str, plan: &[TodoItem]) -> String {
        // Request and plan text go into comments, which need no escaping.
        let request = comment_lines(request, "# ");
        let steps = plan
            .iter()
            .map(|t| comment_lines(&t.description, "    # - "))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#""""Skeleton produced without a language model.

Configure ANTHROPIC_BASE_URL and ANTHROPIC_AUTH_TOKEN (or OPENAI_API_KEY)
for a real implementation.
"""

# Generated code for:
{request}


def generated_function():
    """Placeholder implementation."""
    # Plan:
{steps}
    raise NotImplementedError


if __name__ == "__main__":
    generated_function()
"#
        )
    }
}

/// Prefix every line of `text` so it stays inside a comment.
fn comment_lines(text: &str, prefix: &str) -> String {
    let lines: Vec<String> = text
        .lines()
        .map(|line| format!("{}{}", prefix, line.replace('\r', " ").trim_end()))
        .collect();
    if lines.is_empty() {
        prefix.trim_end().to_string()
    } else {
        lines.join("\n")
    }
}
