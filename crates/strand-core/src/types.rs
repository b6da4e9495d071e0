use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique run identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message as sent to and received from the completion service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: Some(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(text.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

/// Requested response encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: ResponseFormatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormatKind {
    Text,
    JsonObject,
    JsonSchema,
}

/// A chat-completion request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            response_format: None,
        }
    }
}

/// Token usage reported by the completion service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: usize,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A chat-completion response. Only the first choice and usage are consumed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletion {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatCompletion {
    /// Content of the first choice, if any.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.message.content.as_deref())
    }
}

/// Run-scoped state of a single node.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Idle,
    Waiting,
    Running,
    Completed,
    Failed,
}

impl NodeState {
    /// `idle`, `waiting` and `running` nodes have not resolved yet.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Idle | Self::Waiting | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Waiting => "waiting",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A structured entry in a run's event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    /// Node that produced the entry.
    pub id: String,
    pub node_type: String,
    #[serde(rename = "type")]
    pub level: LogLevel,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(
        id: impl Into<String>,
        node_type: impl Into<String>,
        level: LogLevel,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            level,
            title: title.into(),
            payload: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub in_tokens: u64,
    pub out_tokens: u64,
    pub amount: f64,
}

impl RunSummary {
    pub fn duration_ms(&self) -> i64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
            (Some(start), None) => (Utc::now() - start).num_milliseconds().max(0),
            _ => 0,
        }
    }

    /// Duration as `mm:ss.mmm`.
    pub fn duration_display(&self) -> String {
        let ms = self.duration_ms();
        format!("{:02}:{:02}.{:03}", ms / 60_000, (ms % 60_000) / 1000, ms % 1000)
    }

    /// Cost with six decimals, zero padded to seven characters.
    pub fn amount_display(&self) -> String {
        format!("{:0>7}", format!("{:.6}", self.amount))
    }
}

/// Event broadcast to all subscribers of a run.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    RunStarted { run_id: RunId },
    NodeStateChanged { node_id: String, state: NodeState },
    NodeLog(LogEvent),
    UsageUpdate { in_tokens: u64, out_tokens: u64, amount: f64 },
    RunStopped { run_id: RunId, summary: RunSummary },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_pending_states() {
        assert!(NodeState::Idle.is_pending());
        assert!(NodeState::Waiting.is_pending());
        assert!(NodeState::Running.is_pending());
        assert!(!NodeState::Completed.is_pending());
        assert!(!NodeState::Failed.is_pending());
    }

    #[test]
    fn test_completion_parse() {
        let json = r#"{
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "hi"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let completion: ChatCompletion = serde_json::from_str(json).unwrap();
        assert_eq!(completion.content(), Some("hi"));
        assert_eq!(completion.usage.total_tokens, 15);
    }

    #[test]
    fn test_request_skips_unset_fields() {
        let req = ChatRequest::new("gpt-4o", vec![ChatMessage::user("hello")]);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("response_format").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_summary_display() {
        let start = Utc::now();
        let summary = RunSummary {
            started_at: Some(start),
            ended_at: Some(start + Duration::milliseconds(61_234)),
            in_tokens: 10,
            out_tokens: 10,
            amount: 0.0015,
        };
        assert_eq!(summary.duration_display(), "01:01.234");
        assert_eq!(summary.amount_display(), "0.001500");
    }

    #[test]
    fn test_log_event_serializes_level_as_type() {
        let event = LogEvent::new("n1", "console_log", LogLevel::Success, "done");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "success");
        assert!(json.get("payload").is_none());
    }
}
