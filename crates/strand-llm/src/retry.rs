use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{info, warn};

use strand_core::config::RetryConfig;
use strand_core::error::{Result, StrandError};
use strand_core::traits::ChatClient;
use strand_core::types::{ChatCompletion, ChatRequest};

/// A chat client that retries failed requests and falls back to alternative providers.
pub struct RetryingClient {
    primary: Box<dyn ChatClient>,
    fallbacks: Vec<Box<dyn ChatClient>>,
    retry_config: RetryConfig,
}

impl RetryingClient {
    pub fn new(
        primary: Box<dyn ChatClient>,
        fallbacks: Vec<Box<dyn ChatClient>>,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            primary,
            fallbacks,
            retry_config,
        }
    }
}

fn is_retryable(e: &StrandError) -> bool {
    match e {
        StrandError::ChatRequest(msg) => {
            msg.contains("429")
                || msg.contains("500")
                || msg.contains("502")
                || msg.contains("503")
                || msg.contains("timeout")
                || msg.contains("connection")
        }
        _ => false,
    }
}

fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let ms = config
        .initial_backoff_ms
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(config.max_backoff_ms);
    // Add jitter: 0.8x to 1.2x
    let jitter = 0.8 + rand::random::<f64>() * 0.4;
    Duration::from_millis((ms as f64 * jitter) as u64)
}

impl ChatClient for RetryingClient {
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatCompletion>> {
        Box::pin(async move {
            let max_retries = self.retry_config.max_retries;

            // Try primary with retries
            let mut last_err = None;
            for attempt in 0..=max_retries {
                match self.primary.chat(request.clone()).await {
                    Ok(completion) => return Ok(completion),
                    Err(e) => {
                        if is_retryable(&e) && attempt < max_retries {
                            let backoff = calculate_backoff(attempt, &self.retry_config);
                            warn!(
                                attempt = attempt + 1,
                                max_retries,
                                backoff_ms = backoff.as_millis() as u64,
                                error = %e,
                                "Retrying chat request"
                            );
                            tokio::time::sleep(backoff).await;
                            last_err = Some(e);
                            continue;
                        }
                        last_err = Some(e);
                        break;
                    }
                }
            }

            // Primary exhausted, try fallbacks
            if !self.fallbacks.is_empty() {
                info!("Primary chat client exhausted, trying fallback models");
            }
            for (i, fallback) in self.fallbacks.iter().enumerate() {
                match fallback.chat(request.clone()).await {
                    Ok(completion) => {
                        info!(fallback = i, model = %completion.model, "Fell back to alternative model");
                        return Ok(completion);
                    }
                    Err(e) => {
                        warn!(fallback = i, error = %e, "Fallback model also failed");
                        continue;
                    }
                }
            }

            Err(last_err.unwrap_or_else(|| StrandError::ChatRequest("All providers failed".into())))
        })
    }
}
