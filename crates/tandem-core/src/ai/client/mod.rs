//! Provider adapters
//!
//! Each adapter implements [`ChatProvider`] for one wire format. Requests are
//! encoded by `ai::format`, bodies decoded by `ai::parsers`, and the HTTP
//! plumbing lives in [`transport`].

mod anthropic;
mod google;
mod openai;
pub mod transport;

pub use anthropic::AnthropicClient;
pub use google::GoogleClient;
pub use openai::OpenAIClient;
pub use transport::{ResponseStream, StreamFailure};

use crate::ai::providers::ProviderType;
use crate::ai::types::{ChatRequest, ResponseEvent};

/// A provider that turns a chat request into a lazy event stream
pub trait ChatProvider: Send + Sync {
    fn provider_type(&self) -> ProviderType;

    /// Whether credentials are present for a call to succeed
    fn is_configured(&self) -> bool;

    /// Nothing is sent until the stream is first polled; dropping the
    /// stream closes the connection.
    fn chat(&self, request: ChatRequest) -> ResponseStream;
}

/// Immediate error for a provider without credentials
pub(crate) fn missing_credentials(provider: ProviderType) -> ResponseStream {
    transport::single_event(ResponseEvent::error(
        format!(
            "{} API key not configured (set {} or add it to the config file)",
            provider,
            provider.api_key_env()
        ),
        Some("CONFIGURATION_ERROR"),
        false,
    ))
}
