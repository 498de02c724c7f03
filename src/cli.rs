//! Command-line interface.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use crate::agent::{AgentState, AgenticLoop};
use crate::config::{Config, ConfigOverrides};

const SEPARATOR: &str = "============================================================";

#[derive(Debug, Parser)]
#[command(name = "coding-agent")]
#[command(about = "Analyze a coding request, plan it, and generate the code")]
#[command(version)]
pub struct Cli {
    /// What to build, in plain language
    pub request: String,

    /// Write the generated code to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the analysis, todo list and tool calls
    #[arg(short, long)]
    pub verbose: bool,

    /// Let the agent search the web, crawl pages and run code
    #[arg(short = 's', long)]
    pub web_search: bool,

    /// OpenAI API key (secondary provider)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Base URL of the primary OpenAI-compatible endpoint
    #[arg(long)]
    pub base_url: Option<String>,

    /// Bearer token for the primary endpoint
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Model used for code generation
    #[arg(long)]
    pub model: Option<String>,

    /// Model used for analysis and planning
    #[arg(long)]
    pub fast_model: Option<String>,

    /// Maximum model round trips per tool loop
    #[arg(long)]
    pub max_iterations: Option<usize>,
}

impl Cli {
    pub fn to_overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            base_url: self.base_url.clone(),
            auth_token: self.auth_token.clone(),
            openai_api_key: self.api_key.clone(),
            model: self.model.clone(),
            fast_model: self.fast_model.clone(),
            max_iterations: self.max_iterations,
            web_search: self.web_search,
        }
    }
}

/// Resolve the configuration, run the agent and report the result.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env(cli.to_overrides())?;
    run_with_config(&cli, &config).await
}

/// Run the agent with an already resolved configuration.
pub async fn run_with_config(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    if !config.has_provider() {
        tracing::warn!("No LLM provider configured, using template fallback");
    }

    let agent = AgenticLoop::from_config(config);
    let state = agent.run(&cli.request).await;

    if cli.verbose {
        print_details(&state);
    }

    if let Some(failure) = &state.failure {
        bail!("agent failed: {}", failure);
    }
    let Some(code) = state.generated_code.as_deref().filter(|c| !c.trim().is_empty()) else {
        bail!("no code was generated");
    };

    match &cli.output {
        Some(path) => {
            tokio::fs::write(path, code)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Code written to {}", path.display());
        }
        None => {
            println!("{}", SEPARATOR);
            println!("{}", code.trim_end());
            println!("{}", SEPARATOR);
        }
    }
    Ok(())
}

fn print_details(state: &AgentState) {
    if let Some(analysis) = &state.analysis {
        println!("Analysis:\n{}\n", analysis);
    }

    if !state.todo_list.is_empty() {
        println!("Todo list:");
        for task in &state.todo_list {
            let mark = if task.is_completed() { "x" } else { " " };
            println!("  [{}] ({}) {}", mark, task.priority, task.description);
        }
        println!();
    }

    for entry in &state.research.searches {
        match &entry.error {
            Some(error) => println!("Search '{}' failed: {}", entry.query, error),
            None => println!("Search '{}': {} results", entry.query, entry.results.len()),
        }
    }
    for call in &state.research.tool_calls {
        let outcome: String = call.to_message_content().chars().take(200).collect();
        println!("Tool {} {} -> {}", call.name, call.input, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProviderConfig, ProviderKind};

    #[test]
    fn parses_request_and_flags() {
        let cli = Cli::try_parse_from([
            "coding-agent",
            "write a csv parser",
            "-o",
            "out.py",
            "-v",
            "-s",
            "--max-iterations",
            "3",
            "--api-key",
            "sk-test",
        ])
        .unwrap();

        assert_eq!(cli.request, "write a csv parser");
        assert_eq!(cli.output, Some(PathBuf::from("out.py")));
        assert!(cli.verbose);

        let overrides = cli.to_overrides();
        assert!(overrides.web_search);
        assert_eq!(overrides.max_iterations, Some(3));
        assert_eq!(overrides.openai_api_key.as_deref(), Some("sk-test"));
        assert!(overrides.base_url.is_none());
    }

    #[test]
    fn request_is_required() {
        assert!(Cli::try_parse_from(["coding-agent"]).is_err());
    }

    #[test]
    fn bad_iteration_count_is_rejected() {
        assert!(Cli::try_parse_from(["coding-agent", "x", "--max-iterations", "many"]).is_err());
    }

    #[tokio::test]
    async fn offline_run_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fib.py");
        let cli = Cli::try_parse_from([
            "coding-agent",
            "fibonacci numbers",
            "-o",
            path.to_str().unwrap(),
        ])
        .unwrap();

        run_with_config(&cli, &Config::default()).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("# fibonacci numbers"));
        assert!(written.contains("def generated_function():"));
    }

    #[tokio::test]
    async fn output_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.py");
        let cli = Cli::try_parse_from(["coding-agent", "x", "-o", path.to_str().unwrap()]).unwrap();

        let err = run_with_config(&cli, &Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to write"));
    }

    #[tokio::test]
    async fn provider_failure_is_an_error() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Config {
            provider: Some(ProviderConfig {
                kind: ProviderKind::OpenAi,
                base_url: format!("http://{}/v1", addr),
                api_key: "sk-test".to_string(),
                model: "m".to_string(),
                fast_model: "m".to_string(),
            }),
            ..Config::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.py");
        let cli = Cli::try_parse_from(["coding-agent", "x", "-o", path.to_str().unwrap()]).unwrap();

        let err = run_with_config(&cli, &config).await.unwrap_err();
        assert!(err.to_string().starts_with("agent failed: analyze_requirement:"));
        assert!(!path.exists());
    }
}
