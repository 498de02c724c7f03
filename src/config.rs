//! Configuration management for the coding agent.
//!
//! Configuration is read once at startup from environment variables and CLI
//! overrides, then passed down explicitly:
//! - `ANTHROPIC_BASE_URL` - Optional. Base URL of the primary OpenAI-compatible endpoint.
//! - `ANTHROPIC_AUTH_TOKEN` - Optional. Bearer token for the primary endpoint.
//!   If either of the two is set, both are required.
//! - `ANTHROPIC_MODEL` - Optional. Primary model. Defaults to `kimi-k2-turbo-preview`.
//! - `ANTHROPIC_SMALL_FAST_MODEL` - Optional. Model for quick tasks. Defaults to the primary model.
//! - `OPENAI_API_KEY` - Optional. Secondary provider key, used when the primary is not configured.
//! - `OPENAI_BASE_URL` - Optional. Defaults to `https://api.openai.com/v1`.
//! - `OPENAI_MODEL` - Optional. Defaults to `gpt-4o-mini`.
//! - `CODING_AGENT_MAX_ITERATIONS` - Optional. Tool-loop iteration cap. Defaults to `5`.
//! - `CODING_AGENT_MAX_TOKENS` - Optional. Completion token cap. Defaults to `4000`.
//! - `CODING_AGENT_SEARCH_URL` - Optional. Web search endpoint override.
//! - `CODING_AGENT_WEB_SEARCH` - Optional. Enable web search by default.
//!
//! With no provider configured the agent runs on its built-in fallback strategy.

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_PRIMARY_MODEL: &str = "kimi-k2-turbo-preview";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SEARCH_URL: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Which remote provider the LLM client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// Endpoint configured through the `ANTHROPIC_*` variables.
    Primary,
    /// OpenAI, configured through `OPENAI_API_KEY`.
    OpenAi,
}

/// Credentials and model names for the selected provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub kind: ProviderKind,

    /// Base URL, without the trailing `/chat/completions`
    pub base_url: String,

    /// Bearer token
    pub api_key: String,

    /// Model used for code generation
    pub model: String,

    /// Model used for analysis and planning
    pub fast_model: String,
}

/// Settings for the built-in tools.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    /// HTML search endpoint queried by `web_search`
    pub search_url: String,

    /// Wall-clock limit for `code_runner`
    pub code_timeout: Duration,

    /// Character cap for text returned by `web_crawl`
    pub crawl_text_limit: usize,

    /// HTTP timeout for `web_crawl`
    pub crawl_timeout: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            code_timeout: Duration::from_secs(5),
            crawl_text_limit: 5000,
            crawl_timeout: Duration::from_secs(10),
        }
    }
}

/// Values supplied on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub model: Option<String>,
    pub fast_model: Option<String>,
    pub max_iterations: Option<usize>,
    pub web_search: bool,
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Selected LLM provider, `None` runs the fallback strategy
    pub provider: Option<ProviderConfig>,

    /// Maximum model calls per tool-use loop
    pub max_iterations: usize,

    /// Completion token cap sent with every request
    pub max_tokens: u32,

    /// Whether the agent may search and crawl the web
    pub web_search: bool,

    /// Built-in tool settings
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: None,
            max_iterations: 5,
            max_tokens: 4000,
            web_search: false,
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, applying CLI overrides.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if only half of the primary
    /// provider credentials are present, and `ConfigError::InvalidValue` for
    /// unparseable numbers or booleans.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F, overrides: ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = overrides.base_url.clone().or_else(|| var("ANTHROPIC_BASE_URL"));
        let auth_token = overrides
            .auth_token
            .clone()
            .or_else(|| var("ANTHROPIC_AUTH_TOKEN"));
        let openai_key = overrides
            .openai_api_key
            .clone()
            .or_else(|| var("OPENAI_API_KEY"));

        let provider = match (base_url, auth_token) {
            (Some(base_url), Some(api_key)) => {
                let model = overrides
                    .model
                    .clone()
                    .or_else(|| var("ANTHROPIC_MODEL"))
                    .unwrap_or_else(|| DEFAULT_PRIMARY_MODEL.to_string());
                let fast_model = overrides
                    .fast_model
                    .clone()
                    .or_else(|| var("ANTHROPIC_SMALL_FAST_MODEL"))
                    .unwrap_or_else(|| model.clone());
                Some(ProviderConfig {
                    kind: ProviderKind::Primary,
                    base_url: trim_base_url(&base_url),
                    api_key,
                    model,
                    fast_model,
                })
            }
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("ANTHROPIC_AUTH_TOKEN".to_string()))
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("ANTHROPIC_BASE_URL".to_string()))
            }
            (None, None) => openai_key.map(|api_key| {
                let model = overrides
                    .model
                    .clone()
                    .or_else(|| var("OPENAI_MODEL"))
                    .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
                let fast_model = overrides.fast_model.clone().unwrap_or_else(|| model.clone());
                ProviderConfig {
                    kind: ProviderKind::OpenAi,
                    base_url: trim_base_url(
                        &var("OPENAI_BASE_URL")
                            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                    ),
                    api_key,
                    model,
                    fast_model,
                }
            }),
        };

        let max_iterations = match overrides.max_iterations {
            Some(n) => n,
            None => parse_var(&var, "CODING_AGENT_MAX_ITERATIONS")?.unwrap_or(5),
        };
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "max iterations".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let max_tokens = parse_var(&var, "CODING_AGENT_MAX_TOKENS")?.unwrap_or(4000);

        let web_search_default = var("CODING_AGENT_WEB_SEARCH")
            .map(|v| {
                parse_bool(&v)
                    .map_err(|e| ConfigError::InvalidValue("CODING_AGENT_WEB_SEARCH".to_string(), e))
            })
            .transpose()?
            .unwrap_or(false);

        let mut tools = ToolsConfig::default();
        if let Some(url) = var("CODING_AGENT_SEARCH_URL") {
            tools.search_url = url;
        }

        Ok(Self {
            provider,
            max_iterations,
            max_tokens,
            web_search: overrides.web_search || web_search_default,
            tools,
        })
    }

    /// Whether an LLM provider is configured.
    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }
}

fn parse_var<T, F>(var: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))
        })
        .transpose()
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
