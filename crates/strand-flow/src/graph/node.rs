use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed set of node types understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Prompt,
    MultiThread,
    ThreadMerge,
    Decision,
    SetState,
    ConsoleLog,
}

impl NodeKind {
    pub const ALL: [NodeKind; 7] = [
        NodeKind::Start,
        NodeKind::Prompt,
        NodeKind::MultiThread,
        NodeKind::ThreadMerge,
        NodeKind::Decision,
        NodeKind::SetState,
        NodeKind::ConsoleLog,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Prompt => "prompt",
            Self::MultiThread => "multi_thread",
            Self::ThreadMerge => "thread_merge",
            Self::Decision => "decision",
            Self::SetState => "set_state",
            Self::ConsoleLog => "console_log",
        }
    }

    /// Fan-out nodes give every outgoing branch its own thread.
    pub fn is_fan_out(self) -> bool {
        matches!(self, Self::MultiThread)
    }

    /// Merge nodes join the branches of a fan-out.
    pub fn is_merge(self) -> bool {
        matches!(self, Self::ThreadMerge)
    }

    /// Branching nodes may have more than one outgoing edge.
    pub fn is_branching(self) -> bool {
        matches!(self, Self::MultiThread | Self::Decision)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted payload of a node.
///
/// `thread` and `parentId` are owned by the thread maintainer; everything
/// else is type-specific and kept verbatim in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    #[serde(default)]
    pub thread: String,
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// A node in a flow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub data: NodeData,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            data: NodeData::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.data.name = Some(name.into());
        self
    }

    /// Set a type-specific field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.data.fields.get(key)
    }

    /// A string field; empty strings count as absent.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.field(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    pub fn thread(&self) -> &str {
        &self.data.thread
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.data.parent_id.as_deref()
    }

    /// Name shown in logs: the configured name, else the id.
    pub fn display_name(&self) -> &str {
        self.data
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(NodeKind::MultiThread.is_fan_out());
        assert!(NodeKind::ThreadMerge.is_merge());
        assert!(NodeKind::Decision.is_branching());
        assert!(!NodeKind::Prompt.is_branching());
        assert_eq!(NodeKind::SetState.to_string(), "set_state");
    }

    #[test]
    fn test_node_json_shape() {
        let json = r#"{
            "id": "set_1",
            "type": "set_state",
            "position": {"x": 10, "y": 20},
            "data": {"thread": "t1", "parentId": "start_0", "name": "Counter", "variable": "count", "value": "1"}
        }"#;
        let node: Node = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind, NodeKind::SetState);
        assert_eq!(node.thread(), "t1");
        assert_eq!(node.parent_id(), Some("start_0"));
        assert_eq!(node.display_name(), "Counter");
        assert_eq!(node.str_field("variable"), Some("count"));

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["data"]["parentId"], "start_0");
        assert_eq!(back["data"]["value"], "1");
        assert!(back.get("position").is_none());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let json = r#"{"id": "x", "type": "teleport", "data": {}}"#;
        assert!(serde_json::from_str::<Node>(json).is_err());
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let node = Node::new("n", NodeKind::ConsoleLog).with_field("log", "  ");
        assert_eq!(node.str_field("log"), None);
        assert_eq!(node.display_name(), "n");
    }
}
