use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use strand_core::config::ModelConfig;
use strand_core::error::Result;
use strand_core::pricing::PriceTable;
use strand_core::traits::{ChatClient, Controller};

use crate::context::SharedContext;
use crate::graph::{Edge, Node, NodeKind};
use crate::runtime::StateWatch;

/// Static description of a node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetadata {
    pub kind: NodeKind,
    pub name: &'static str,
    pub description: &'static str,
}

/// A field a node publishes into the execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputField {
    pub name: String,
    pub title: String,
    pub description: String,
}

impl OutputField {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            description: description.into(),
        }
    }
}

/// An outgoing edge together with the node it leads to.
#[derive(Debug, Clone, Copy)]
pub struct Branch<'a> {
    pub edge: &'a Edge,
    pub node: &'a Node,
}

/// Everything a processor may touch while running one node.
pub struct ProcessScope<'a> {
    pub context: &'a SharedContext,
    pub node: &'a Node,
    /// Outgoing branches in edge insertion order.
    pub outgoing: Vec<Branch<'a>>,
    pub incoming: Vec<&'a Node>,
    pub controller: &'a dyn Controller,
    pub states: StateWatch,
    /// Longest a barrier may wait for its incoming branches.
    pub merge_timeout: Option<Duration>,
}

impl<'a> ProcessScope<'a> {
    /// Every outgoing node, for processors that don't route.
    pub fn all_outgoing(&self) -> Vec<&'a Node> {
        self.outgoing.iter().map(|b| b.node).collect()
    }
}

/// Behavior of one node type.
///
/// The engine and the thread maintainer only ever see this trait; adding a
/// node type means implementing it and registering it.
pub trait NodeBehavior: Send + Sync + 'static {
    fn kind(&self) -> NodeKind;

    fn metadata(&self) -> NodeMetadata;

    /// Run the node, write its output record into the context, and return
    /// the outgoing nodes execution continues into. An error fails the node.
    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>>;

    /// Fields this node offers to downstream placeholders.
    fn outputs(&self, _node: &Node) -> Vec<OutputField> {
        vec![]
    }

    /// Context key the node's values live under, when it isn't the node id.
    fn value_identifier(&self, _node: &Node) -> Option<String> {
        None
    }

    /// Called when an edge leaving a node of this type is created.
    fn on_connect(&self, _edge: &mut Edge) {}

    /// Called when an edge leaving a node of this type is removed.
    fn on_disconnect(&self, _edge: &mut Edge) {}
}

/// Lookup table from node type to behavior.
pub struct NodeRegistry {
    behaviors: HashMap<NodeKind, Arc<dyn NodeBehavior>>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            behaviors: HashMap::new(),
        }
    }

    /// Register a behavior, replacing any previous one for the same type.
    pub fn register(&mut self, behavior: impl NodeBehavior) {
        self.behaviors.insert(behavior.kind(), Arc::new(behavior));
    }

    pub fn get(&self, kind: NodeKind) -> Option<Arc<dyn NodeBehavior>> {
        self.behaviors.get(&kind).cloned()
    }

    /// Borrowed lookup, for callers that hold the registry for the whole run.
    pub fn behavior(&self, kind: NodeKind) -> Option<&dyn NodeBehavior> {
        self.behaviors.get(&kind).map(|b| b.as_ref())
    }

    /// Metadata of every registered type, in declaration order.
    pub fn list(&self) -> Vec<NodeMetadata> {
        NodeKind::ALL
            .iter()
            .filter_map(|kind| self.behaviors.get(kind))
            .map(|b| b.metadata())
            .collect()
    }

    /// Create a registry with all built-in node types registered.
    pub fn with_builtins(
        client: Arc<dyn ChatClient>,
        model: ModelConfig,
        prices: PriceTable,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(crate::nodes::start::StartNode);
        registry.register(crate::nodes::prompt::PromptNode::new(client, model, prices));
        registry.register(crate::nodes::multi_thread::MultiThreadNode);
        registry.register(crate::nodes::thread_merge::ThreadMergeNode);
        registry.register(crate::nodes::decision::DecisionNode);
        registry.register(crate::nodes::set_state::SetStateNode);
        registry.register(crate::nodes::console_log::ConsoleLogNode);
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strand_llm::FakeChatClient;

    fn registry() -> NodeRegistry {
        NodeRegistry::with_builtins(
            Arc::new(FakeChatClient::new("ok", Duration::ZERO)),
            ModelConfig::default(),
            PriceTable::default(),
        )
    }

    #[test]
    fn test_builtins_cover_every_kind() {
        let registry = registry();
        for kind in NodeKind::ALL {
            let behavior = registry.get(kind).unwrap();
            assert_eq!(behavior.kind(), kind);
            assert_eq!(behavior.metadata().kind, kind);
        }
        assert_eq!(registry.list().len(), NodeKind::ALL.len());
    }

    #[test]
    fn test_decision_hooks_manage_metadata() {
        let registry = registry();
        let decision = registry.get(NodeKind::Decision).unwrap();
        let mut edge = Edge::new("d", "x");
        decision.on_connect(&mut edge);
        assert_eq!(edge.data, Some(crate::graph::DecisionMeta::pending()));
        decision.on_disconnect(&mut edge);
        assert!(edge.data.is_none());

        let prompt = registry.get(NodeKind::Prompt).unwrap();
        let mut edge = Edge::new("p", "x");
        prompt.on_connect(&mut edge);
        assert!(edge.data.is_none());
    }

    #[test]
    fn test_set_state_values_live_under_state() {
        let registry = registry();
        let node = Node::new("s", NodeKind::SetState);
        assert_eq!(
            registry.get(NodeKind::SetState).unwrap().value_identifier(&node),
            Some("state".to_string())
        );
        assert_eq!(
            registry.get(NodeKind::Prompt).unwrap().value_identifier(&node),
            None
        );
    }
}
