use std::time::Duration;

use anyhow::{Context, Result};
use clap::ValueEnum;

/// Planning/Acting cycles allowed before a run is declared over budget.
pub const MAX_ITERATIONS: usize = 25;

/// Interactive-element inventory entries included in one observation message.
pub const ELEMENT_INVENTORY_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderKind {
    Openai,
    Gemini,
}

impl ProviderKind {
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-2.0-flash",
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::Openai => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }
}

/// Per-run agent configuration, resolved from CLI flags and the environment.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub api_key: String,
    /// Page-load and session-default browser timeout.
    pub timeout: Duration,
    pub max_retries: u32,
    pub max_iterations: usize,
}

impl AgentConfig {
    pub fn resolve(
        provider: ProviderKind,
        model: Option<String>,
        api_key: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let api_key = match api_key {
            Some(key) => key,
            None => std::env::var(provider.api_key_var()).with_context(|| {
                format!(
                    "no API key: pass --api-key or set {}",
                    provider.api_key_var()
                )
            })?,
        };
        Ok(Self {
            provider,
            model: model.unwrap_or_else(|| provider.default_model().to_string()),
            api_key,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            max_iterations: MAX_ITERATIONS,
        })
    }
}
