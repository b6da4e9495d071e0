use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Result, StrandError};

/// Top-level Strand configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    /// Per-1K-token price overrides keyed by model id.
    #[serde(default)]
    pub pricing: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Default sampling temperature for prompt nodes that don't set one.
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    /// Reply returned by the `fake` provider.
    #[serde(default)]
    pub fake_output: Option<String>,
    /// Artificial latency of the `fake` provider in milliseconds.
    #[serde(default = "default_fake_latency_ms")]
    pub fake_latency_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
            retry: None,
            extra_headers: HashMap::new(),
            fake_output: None,
            fake_latency_ms: default_fake_latency_ms(),
        }
    }
}

fn default_provider() -> String { "openai".to_string() }
fn default_model_id() -> String { "gpt-4o-mini".to_string() }
fn default_fake_latency_ms() -> u64 { 1000 }

/// Retry configuration for chat requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Execution engine limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Longest a merge node waits for its incoming branches. 0 = forever.
    #[serde(default = "default_merge_timeout")]
    pub merge_timeout_secs: u64,
    /// Longest a single node processor may run. 0 = forever.
    #[serde(default = "default_node_timeout")]
    pub node_timeout_secs: u64,
    /// How long terminal node states stay visible after a run stops.
    #[serde(default = "default_reset_delay")]
    pub reset_delay_ms: u64,
    /// A node entered more often than this in one run is not executed again.
    #[serde(default = "default_max_node_visits")]
    pub max_node_visits: usize,
    /// JSONL run logging.
    #[serde(default)]
    pub log: Option<LogConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            merge_timeout_secs: default_merge_timeout(),
            node_timeout_secs: default_node_timeout(),
            reset_delay_ms: default_reset_delay(),
            max_node_visits: default_max_node_visits(),
            log: None,
        }
    }
}

impl EngineConfig {
    pub fn merge_timeout(&self) -> Option<Duration> {
        (self.merge_timeout_secs > 0).then(|| Duration::from_secs(self.merge_timeout_secs))
    }

    pub fn node_timeout(&self) -> Option<Duration> {
        (self.node_timeout_secs > 0).then(|| Duration::from_secs(self.node_timeout_secs))
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }
}

fn default_merge_timeout() -> u64 { 300 }
fn default_node_timeout() -> u64 { 120 }
fn default_reset_delay() -> u64 { 3000 }
fn default_max_node_visits() -> usize { 25 }

/// JSONL run logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: ./logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// Logging level: 1 = run summary only, 2 = node states + usage, 3 = node log events (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: 2,
        }
    }
}

impl LogConfig {
    pub fn dir(&self) -> PathBuf {
        PathBuf::from(self.log_dir.as_deref().unwrap_or("logs"))
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            fallback_models: vec![],
            engine: EngineConfig::default(),
            pricing: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrandError::ConfigNotFound(path.display().to_string()))?;

        Self::parse(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        toml::from_str(&expanded).map_err(|e| StrandError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => {
                    warn!(var = %var_name, "Environment variable not set, keeping placeholder");
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
