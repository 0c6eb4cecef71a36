//! Anthropic Messages API adapter

use std::sync::Arc;

use tracing::debug;

use super::transport::{send_and_decode, ResponseStream};
use super::{missing_credentials, ChatProvider};
use crate::ai::format::{AnthropicFormat, FormatHandler};
use crate::ai::parsers::{decode_anthropic_message, AnthropicParser, BufferedJsonDecoder};
use crate::ai::providers::{CredentialSource, ProviderType};
use crate::ai::sse::SseDecoder;
use crate::ai::types::ChatRequest;

pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
}

impl AnthropicClient {
    pub fn new(http: reqwest::Client, credentials: Arc<dyn CredentialSource>) -> Self {
        Self { http, credentials }
    }
}

impl ChatProvider for AnthropicClient {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Anthropic
    }

    fn is_configured(&self) -> bool {
        self.credentials
            .credentials(ProviderType::Anthropic)
            .api_key()
            .is_some()
    }

    fn chat(&self, request: ChatRequest) -> ResponseStream {
        let creds = self.credentials.credentials(ProviderType::Anthropic);
        let Some(api_key) = creds.api_key() else {
            return missing_credentials(ProviderType::Anthropic);
        };

        let url = format!(
            "{}/v1/messages",
            creds.base_url_for(ProviderType::Anthropic)
        );
        let body = AnthropicFormat::new().build_request_body(&request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Anthropic request"
        );

        let builder = self
            .http
            .post(url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);

        if request.stream {
            send_and_decode("Anthropic", builder, SseDecoder::new(AnthropicParser::new()))
        } else {
            send_and_decode(
                "Anthropic",
                builder,
                BufferedJsonDecoder::new(decode_anthropic_message),
            )
        }
    }
}
