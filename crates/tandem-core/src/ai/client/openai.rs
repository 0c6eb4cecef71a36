//! OpenAI-compatible chat/completions adapter
//!
//! Also used for local and self-hosted servers; a custom base URL counts as
//! configured even without a key.

use std::sync::Arc;

use tracing::debug;

use super::transport::{send_and_decode, ResponseStream};
use super::{missing_credentials, ChatProvider};
use crate::ai::format::{FormatHandler, OpenAIFormat};
use crate::ai::parsers::{decode_openai_completion, BufferedJsonDecoder, OpenAIParser};
use crate::ai::providers::{CredentialSource, ProviderType};
use crate::ai::sse::SseDecoder;
use crate::ai::types::ChatRequest;

pub struct OpenAIClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
}

impl OpenAIClient {
    pub fn new(http: reqwest::Client, credentials: Arc<dyn CredentialSource>) -> Self {
        Self { http, credentials }
    }
}

impl ChatProvider for OpenAIClient {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAI
    }

    fn is_configured(&self) -> bool {
        let creds = self.credentials.credentials(ProviderType::OpenAI);
        creds.api_key().is_some() || creds.has_custom_base_url(ProviderType::OpenAI)
    }

    fn chat(&self, request: ChatRequest) -> ResponseStream {
        let creds = self.credentials.credentials(ProviderType::OpenAI);
        let api_key = creds.api_key();
        if api_key.is_none() && !creds.has_custom_base_url(ProviderType::OpenAI) {
            return missing_credentials(ProviderType::OpenAI);
        }

        let url = format!(
            "{}/chat/completions",
            creds.base_url_for(ProviderType::OpenAI)
        );
        let body = OpenAIFormat::new().build_request_body(&request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "OpenAI request"
        );

        let mut builder = self.http.post(url).json(&body);
        if let Some(key) = api_key {
            builder = builder.bearer_auth(key);
        }

        if request.stream {
            send_and_decode("OpenAI", builder, SseDecoder::new(OpenAIParser::new()))
        } else {
            send_and_decode(
                "OpenAI",
                builder,
                BufferedJsonDecoder::new(decode_openai_completion),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::providers::{ProviderCredentials, StaticCredentials};

    #[test]
    fn test_custom_base_url_counts_as_configured() {
        let local = OpenAIClient::new(
            reqwest::Client::new(),
            Arc::new(StaticCredentials::new().with(
                ProviderType::OpenAI,
                ProviderCredentials::default().with_base_url("http://localhost:1234/v1"),
            )),
        );
        assert!(local.is_configured());

        let bare = OpenAIClient::new(reqwest::Client::new(), Arc::new(StaticCredentials::new()));
        assert!(!bare.is_configured());
    }
}
