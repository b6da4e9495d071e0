use std::time::Duration;

use futures::future::BoxFuture;

use strand_core::config::ModelConfig;
use strand_core::error::Result;
use strand_core::traits::ChatClient;
use strand_core::types::{ChatChoice, ChatCompletion, ChatMessage, ChatRequest, Usage};

/// Offline chat client: answers every request with a fixed reply.
///
/// Reports 10 prompt and 10 completion tokens per call so cost accounting
/// can be exercised without network access.
pub struct FakeChatClient {
    output: String,
    latency: Duration,
}

impl FakeChatClient {
    pub fn new(output: impl Into<String>, latency: Duration) -> Self {
        Self {
            output: output.into(),
            latency,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            config.fake_output.clone().unwrap_or_default(),
            Duration::from_millis(config.fake_latency_ms),
        )
    }
}

impl ChatClient for FakeChatClient {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatCompletion>> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            Ok(ChatCompletion {
                id: format!("fake-{}", uuid::Uuid::new_v4().simple()),
                model: request.model,
                choices: vec![ChatChoice {
                    index: 0,
                    message: ChatMessage::assistant(self.output.clone()),
                    finish_reason: Some("stop".into()),
                }],
                usage: Usage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                },
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_reply_and_usage() {
        let client = FakeChatClient::new("pong", Duration::ZERO);
        let completion = client
            .chat(ChatRequest::new("gpt-4o", vec![ChatMessage::user("ping")]))
            .await
            .unwrap();
        assert_eq!(completion.content(), Some("pong"));
        assert_eq!(completion.model, "gpt-4o");
        assert_eq!(completion.usage.total_tokens, 20);
    }
}
