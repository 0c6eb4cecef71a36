//! Google Gemini adapter

use std::sync::Arc;

use tracing::debug;

use super::transport::{send_and_decode, single_event, ResponseStream};
use super::{missing_credentials, ChatProvider};
use crate::ai::format::{FormatHandler, GoogleFormat};
use crate::ai::parsers::{GoogleParser, GoogleParserOptions};
use crate::ai::providers::{CredentialSource, ProviderType};
use crate::ai::types::{ChatRequest, ResponseEvent};

pub struct GoogleClient {
    http: reqwest::Client,
    credentials: Arc<dyn CredentialSource>,
    parser_options: GoogleParserOptions,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            http,
            credentials,
            parser_options: GoogleParserOptions::default(),
        }
    }

    pub fn with_parser_options(mut self, options: GoogleParserOptions) -> Self {
        self.parser_options = options;
        self
    }
}

/// Header carrying the API key; it never goes into the URL
const API_KEY_HEADER: &str = "x-goog-api-key";

/// `{base}/v1beta/models/{model}:{method}`
pub(crate) fn endpoint_url(base: &str, model: &str, stream: bool) -> Result<url::Url, url::ParseError> {
    let method = if stream {
        "streamGenerateContent"
    } else {
        "generateContent"
    };
    url::Url::parse(&format!("{}/v1beta/models/{}:{}", base, model, method))
}

impl ChatProvider for GoogleClient {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Google
    }

    fn is_configured(&self) -> bool {
        self.credentials
            .credentials(ProviderType::Google)
            .api_key()
            .is_some()
    }

    fn chat(&self, request: ChatRequest) -> ResponseStream {
        let creds = self.credentials.credentials(ProviderType::Google);
        let Some(api_key) = creds.api_key() else {
            return missing_credentials(ProviderType::Google);
        };

        let base = creds.base_url_for(ProviderType::Google);
        let url = match endpoint_url(&base, &request.model, request.stream) {
            Ok(url) => url,
            Err(e) => {
                return single_event(ResponseEvent::error(
                    format!("Invalid Gemini endpoint '{}': {}", base, e),
                    Some("CONFIGURATION_ERROR"),
                    false,
                ))
            }
        };
        let body = GoogleFormat::new().build_request_body(&request);
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Gemini request"
        );

        // Streaming and one-shot bodies both decode through the brace scanner
        let builder = self
            .http
            .post(url)
            .header(API_KEY_HEADER, api_key)
            .json(&body);
        send_and_decode(
            "Gemini",
            builder,
            GoogleParser::with_options(self.parser_options),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::providers::{ProviderCredentials, StaticCredentials};
    use crate::ai::types::ChatMessage;
    use futures::StreamExt;

    #[test]
    fn test_endpoint_url_has_no_credentials() {
        let url = endpoint_url(
            "https://generativelanguage.googleapis.com",
            "gemini-2.5-flash",
            true,
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:streamGenerateContent"
        );
        assert_eq!(url.query(), None);
        let url = endpoint_url("http://localhost", "m", false).unwrap();
        assert!(url.path().ends_with(":generateContent"));
    }

    #[tokio::test]
    async fn test_connection_error_does_not_expose_key() {
        let credentials = StaticCredentials::new().with(
            ProviderType::Google,
            ProviderCredentials::new("SUPERSECRETKEY123").with_base_url("http://127.0.0.1:9"),
        );
        let client = GoogleClient::new(reqwest::Client::new(), Arc::new(credentials));
        let request = ChatRequest::new("gemini-2.5-flash", vec![ChatMessage::user("hi")]);

        let events: Vec<ResponseEvent> = client.chat(request).collect().await;
        assert_eq!(events.len(), 1);
        let ResponseEvent::Error { message, code, .. } = &events[0] else {
            panic!("expected a connection error, got {:?}", events[0]);
        };
        assert_eq!(code.as_deref(), Some("NETWORK_ERROR"));
        assert!(!message.contains("SUPERSECRETKEY123"), "{}", message);
        assert!(!message.contains("127.0.0.1"), "{}", message);
    }
}
