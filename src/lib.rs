//! # Coding Agent
//!
//! Turns a natural-language coding request into code.
//!
//! This library provides:
//! - A four-stage agent loop (analyze, plan, generate)
//! - A bounded tool-calling loop over an OpenAI-compatible chat endpoint
//! - Built-in web search, web crawl and code runner tools
//! - A template fallback when no model provider is configured
//!
//! ## Example
//!
//! ```rust,ignore
//! use coding_agent::{agent::AgenticLoop, config::{Config, ConfigOverrides}};
//!
//! let config = Config::from_env(ConfigOverrides::default())?;
//! let state = AgenticLoop::from_config(&config).run("Write a CSV parser").await;
//! println!("{}", state.generated_code.unwrap_or_default());
//! ```

pub mod agent;
pub mod cli;
pub mod config;
pub mod llm;
pub mod tools;

#[cfg(test)]
mod test_support;

pub use config::Config;
