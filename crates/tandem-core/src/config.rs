//! User configuration (~/.tandem/config.toml)
//!
//! Every section is optional; a missing file yields defaults. API keys from
//! the environment take precedence over the file.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::agent::orchestrator::DEFAULT_MAX_ITERATIONS;
use crate::agent::subagent::SubagentConfig;
use crate::ai::providers::{CredentialSource, ProviderCredentials, ProviderType};
use crate::ai::types::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::error::{CoreError, CoreResult};
use crate::mcp::McpConfig;
use crate::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub providers: ProvidersConfig,
    pub agent: AgentConfig,
    pub subagents: SubagentsConfig,
    pub mcp: McpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ProviderType,
    /// Falls back to the provider's default model
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderType::default(),
            model: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderCredentials,
    pub openai: ProviderCredentials,
    pub google: ProviderCredentials,
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderType) -> &ProviderCredentials {
        match provider {
            ProviderType::Anthropic => &self.anthropic,
            ProviderType::OpenAI => &self.openai,
            ProviderType::Google => &self.google,
        }
    }

    fn get_mut(&mut self, provider: ProviderType) -> &mut ProviderCredentials {
        match provider {
            ProviderType::Anthropic => &mut self.anthropic,
            ProviderType::OpenAI => &mut self.openai,
            ProviderType::Google => &mut self.google,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub tool_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tool_timeout_secs: 120,
        }
    }
}

impl AgentConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubagentsConfig {
    pub max_subagents: usize,
    pub stagger_ms: u64,
    pub max_iterations: usize,
    pub default_retry_secs: u64,
    pub max_retry_secs: u64,
}

impl Default for SubagentsConfig {
    fn default() -> Self {
        let defaults = SubagentConfig::default();
        Self {
            max_subagents: defaults.max_subagents,
            stagger_ms: u64::try_from(defaults.stagger.as_millis()).unwrap_or(u64::MAX),
            max_iterations: defaults.max_iterations,
            default_retry_secs: defaults.default_retry_after.as_secs(),
            max_retry_secs: defaults.max_retry_after.as_secs(),
        }
    }
}

impl SubagentsConfig {
    pub fn to_subagent_config(&self) -> SubagentConfig {
        SubagentConfig {
            max_subagents: self.max_subagents,
            stagger: Duration::from_millis(self.stagger_ms),
            max_iterations: self.max_iterations,
            default_retry_after: Duration::from_secs(self.default_retry_secs),
            max_retry_after: Duration::from_secs(self.max_retry_secs),
        }
    }
}

impl Config {
    /// Load from the default location and apply environment overrides
    pub fn load() -> CoreResult<Self> {
        let mut config = Self::load_from(&paths::config_path())?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Parse `path`; a missing file gives the defaults
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Override API keys from `lookup`, one variable per provider
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        for provider in ProviderType::all() {
            if let Some(key) = lookup(provider.api_key_env()).filter(|k| !k.trim().is_empty()) {
                self.providers.get_mut(*provider).api_key = Some(key);
            }
        }
    }

    fn validate(&self) -> CoreResult<()> {
        if self.agent.max_iterations == 0 {
            return Err(CoreError::configuration("agent.max_iterations must be at least 1"));
        }
        if self.subagents.max_subagents == 0 {
            return Err(CoreError::configuration(
                "subagents.max_subagents must be at least 1",
            ));
        }
        if self.subagents.max_iterations == 0 {
            return Err(CoreError::configuration(
                "subagents.max_iterations must be at least 1",
            ));
        }
        Ok(())
    }

    /// Configured model, or the provider default
    pub fn model_name(&self) -> String {
        self.model
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.model.provider.default_model().to_string())
    }
}

impl CredentialSource for Config {
    fn credentials(&self, provider: ProviderType) -> ProviderCredentials {
        self.providers.get(provider).clone()
    }
}
