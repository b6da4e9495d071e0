use futures::future::BoxFuture;
use reqwest::Client;
use tracing::{debug, warn};

use strand_core::config::ModelConfig;
use strand_core::error::{Result, StrandError};
use strand_core::traits::ChatClient;
use strand_core::types::{ChatCompletion, ChatRequest};

/// Chat-completion endpoints for the `provider` names strand understands
/// without a `base_url`, and whether each expects a bearer key.
const KNOWN_ENDPOINTS: &[(&str, &str, bool)] = &[
    ("openai", "https://api.openai.com/v1/chat/completions", true),
    ("ollama", "http://localhost:11434/v1/chat/completions", false),
    ("groq", "https://api.groq.com/openai/v1/chat/completions", true),
    ("openrouter", "https://openrouter.ai/api/v1/chat/completions", true),
    ("together", "https://api.together.xyz/v1/chat/completions", true),
    ("mistral", "https://api.mistral.ai/v1/chat/completions", true),
    ("deepseek", "https://api.deepseek.com/v1/chat/completions", true),
];

/// OpenAI-compatible client. Works with OpenAI, Ollama, Groq, OpenRouter, etc.
pub struct OpenAiClient {
    http: Client,
    config: ModelConfig,
    endpoint: String,
    needs_api_key: bool,
}

impl OpenAiClient {
    /// An explicit `base_url` wins over the provider's known endpoint.
    /// A provider with neither is unsupported.
    pub fn new(config: ModelConfig) -> Result<Self> {
        let known = KNOWN_ENDPOINTS
            .iter()
            .find(|(name, _, _)| *name == config.provider);

        let endpoint = match (config.base_url.as_deref(), known) {
            (Some(url), _) => url.to_string(),
            (None, Some((_, url, _))) => url.to_string(),
            (None, None) => return Err(StrandError::UnsupportedProvider(config.provider.clone())),
        };

        Ok(Self {
            http: Client::new(),
            needs_api_key: known.map_or(true, |(_, _, key)| *key),
            endpoint,
            config,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ChatClient for OpenAiClient {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatCompletion>> {
        Box::pin(async move {
            if self.config.api_key.is_none() && self.needs_api_key {
                warn!(provider = %self.config.provider, "No API key configured for chat provider");
            }

            let mut req = self.http.post(&self.endpoint).json(&request);

            if let Some(api_key) = &self.config.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }

            for (k, v) in &self.config.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            debug!(model = %request.model, messages = request.messages.len(), "Sending chat request");

            let response = req
                .send()
                .await
                .map_err(|e| StrandError::ChatRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(StrandError::ChatRequest(format!("HTTP {}: {}", status, body)));
            }

            let completion: ChatCompletion = response
                .json()
                .await
                .map_err(|e| StrandError::ChatParse(e.to_string()))?;

            if completion.choices.is_empty() {
                return Err(StrandError::ChatParse("response has no choices".into()));
            }

            Ok(completion)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_resolution() {
        let mut config = ModelConfig::default();
        assert_eq!(
            OpenAiClient::new(config.clone()).unwrap().endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );

        config.provider = "ollama".into();
        let client = OpenAiClient::new(config.clone()).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/v1/chat/completions");
        assert!(!client.needs_api_key);

        config.base_url = Some("http://proxy.local/v1/chat/completions".into());
        assert_eq!(
            OpenAiClient::new(config).unwrap().endpoint(),
            "http://proxy.local/v1/chat/completions"
        );
    }

    #[test]
    fn test_unknown_provider_needs_base_url() {
        let mut config = ModelConfig {
            provider: "acme".into(),
            ..ModelConfig::default()
        };
        let err = OpenAiClient::new(config.clone()).err().unwrap();
        assert!(matches!(err, StrandError::UnsupportedProvider(ref p) if p == "acme"));

        config.base_url = Some("https://llm.acme.test/v1/chat/completions".into());
        let client = OpenAiClient::new(config).unwrap();
        assert!(client.needs_api_key);
    }
}
