//! Provider identity, credentials, and adapter selection
//!
//! Credentials are looked up through a [`CredentialSource`] on every call, so
//! a settings change takes effect on the next request without rebuilding
//! adapters.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::ai::client::{AnthropicClient, ChatProvider, GoogleClient, OpenAIClient};
use crate::ai::types::{ChatMessage, ChatRequest, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::error::{CoreError, CoreResult};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const GOOGLE_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Wire-protocol family of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(alias = "gemini")]
    Google,
}

impl ProviderType {
    pub fn all() -> &'static [ProviderType] {
        &[
            ProviderType::Anthropic,
            ProviderType::OpenAI,
            ProviderType::Google,
        ]
    }

    /// Key used in config files
    pub fn storage_key(&self) -> &'static str {
        match self {
            ProviderType::Anthropic => "anthropic",
            ProviderType::OpenAI => "openai",
            ProviderType::Google => "google",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ProviderType::Anthropic => ANTHROPIC_API_BASE,
            ProviderType::OpenAI => OPENAI_API_BASE,
            ProviderType::Google => GOOGLE_API_BASE,
        }
    }

    /// Environment variable consulted for the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            ProviderType::Anthropic => "ANTHROPIC_API_KEY",
            ProviderType::OpenAI => "OPENAI_API_KEY",
            ProviderType::Google => "GEMINI_API_KEY",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::Anthropic => "claude-sonnet-4-5",
            ProviderType::OpenAI => "gpt-4o",
            ProviderType::Google => "gemini-2.5-flash",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "Anthropic"),
            ProviderType::OpenAI => write!(f, "OpenAI"),
            ProviderType::Google => write!(f, "Google Gemini"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(ProviderType::Anthropic),
            "openai" | "openai-compatible" => Ok(ProviderType::OpenAI),
            "google" | "gemini" => Ok(ProviderType::Google),
            other => Err(CoreError::configuration(format!(
                "Unknown provider '{}'. Expected one of: anthropic, openai, google",
                other
            ))),
        }
    }
}

/// API key and endpoint for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCredentials {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl ProviderCredentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Non-blank API key, if any
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Configured base URL without a trailing slash, or the provider default
    pub fn base_url_for(&self, provider: ProviderType) -> String {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// True when pointed somewhere other than the vendor's own endpoint
    pub fn has_custom_base_url(&self, provider: ProviderType) -> bool {
        self.base_url_for(provider) != provider.default_base_url()
    }
}

/// External settings collaborator, consulted per call
pub trait CredentialSource: Send + Sync {
    fn credentials(&self, provider: ProviderType) -> ProviderCredentials;
}

/// Fixed credentials, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<ProviderType, ProviderCredentials>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: ProviderType, credentials: ProviderCredentials) -> Self {
        self.entries.insert(provider, credentials);
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self, provider: ProviderType) -> ProviderCredentials {
        self.entries.get(&provider).cloned().unwrap_or_default()
    }
}

/// The adapter and model parameters a loop talks to
#[derive(Clone)]
pub struct ModelSelection {
    pub provider: Arc<dyn ChatProvider>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ModelSelection {
    pub fn new(provider: Arc<dyn ChatProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Streaming request for `messages` with this selection's parameters
    pub fn request(&self, messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest::new(self.model.clone(), messages)
            .with_max_tokens(self.max_tokens)
            .with_temperature(self.temperature)
    }
}

impl fmt::Debug for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelSelection")
            .field("provider", &self.provider.provider_type())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client shared by every adapter
pub fn build_http_client() -> CoreResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("tandem/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Build the adapter for `provider`
pub fn create_provider(
    provider: ProviderType,
    http: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
) -> Arc<dyn ChatProvider> {
    match provider {
        ProviderType::Anthropic => Arc::new(AnthropicClient::new(http, credentials)),
        ProviderType::OpenAI => Arc::new(OpenAIClient::new(http, credentials)),
        ProviderType::Google => Arc::new(GoogleClient::new(http, credentials)),
    }
}
