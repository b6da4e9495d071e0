use serde::{Deserialize, Serialize};

/// Whether a decision edge carries a condition or is the fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    #[default]
    Normal,
    Else,
}

/// Routing rule attached to an edge leaving a decision node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub condition: String,
    #[serde(rename = "type", default)]
    pub kind: DecisionKind,
    /// Set while the rule still needs a condition.
    #[serde(default)]
    pub required: bool,
}

impl DecisionMeta {
    /// Placeholder rule attached when a decision node gains an edge.
    pub fn pending() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn when(name: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: condition.into(),
            kind: DecisionKind::Normal,
            required: false,
        }
    }

    pub fn otherwise(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            condition: String::new(),
            kind: DecisionKind::Else,
            required: false,
        }
    }

    pub fn is_else(&self) -> bool {
        self.kind == DecisionKind::Else
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DecisionMeta>,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            target,
            data: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_decision(mut self, meta: DecisionMeta) -> Self {
        self.data = Some(meta);
        self
    }
}
