pub mod fake;
pub mod providers;
pub mod retry;

use strand_core::config::{AppConfig, ModelConfig};
use strand_core::error::Result;
use strand_core::traits::ChatClient;

pub use fake::FakeChatClient;
pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create a chat client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn ChatClient>> {
    match config.provider.as_str() {
        "fake" | "test" => Ok(Box::new(FakeChatClient::from_config(config))),
        // Everything else uses the OpenAI-compatible client
        _ => Ok(Box::new(OpenAiClient::new(config.clone())?)),
    }
}

/// Create the primary client wrapped with retries and the configured fallbacks.
pub fn create_retrying_client(config: &AppConfig) -> Result<Box<dyn ChatClient>> {
    let primary = create_client(&config.model)?;
    let fallbacks = config
        .fallback_models
        .iter()
        .map(create_client)
        .collect::<Result<Vec<_>>>()?;
    let retry = config.model.retry.clone().unwrap_or_default();
    Ok(Box::new(RetryingClient::new(primary, fallbacks, retry)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_core::error::StrandError;

    #[test]
    fn test_unsupported_fallback_fails_the_chain() {
        let mut config = AppConfig::default();
        config.model.provider = "fake".into();
        assert!(create_retrying_client(&config).is_ok());

        config.fallback_models.push(ModelConfig {
            provider: "acme".into(),
            ..ModelConfig::default()
        });
        let err = create_retrying_client(&config).err().unwrap();
        assert!(matches!(err, StrandError::UnsupportedProvider(_)));
    }
}
