use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};

use strand_core::error::{Result, StrandError};

use super::edge::Edge;
use super::node::{Node, NodeKind};

/// Serialization unit shared by flow files, import/export and the clipboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl FlowDocument {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// A flow graph stored as an arena of node slots.
///
/// Node indices stay stable for the lifetime of the graph; removed nodes
/// leave an empty slot. Edges keep their insertion order, which decides
/// decision evaluation order and merge tie-breaks.
#[derive(Debug, Clone, Default)]
pub struct FlowGraph {
    slots: Vec<Option<Node>>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
}

impl FlowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a document without touching thread tags.
    pub fn from_document(doc: FlowDocument) -> Result<Self> {
        let mut graph = Self::new();
        for node in doc.nodes {
            graph.add_node(node)?;
        }
        for edge in doc.edges {
            for end in [&edge.source, &edge.target] {
                if !graph.contains(end) {
                    return Err(StrandError::NodeNotFound(end.clone()));
                }
            }
            graph.edges.push(edge);
        }
        Ok(graph)
    }

    pub fn to_document(&self) -> FlowDocument {
        FlowDocument {
            nodes: self.nodes().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    /// Insert a node, returning its slot index.
    pub fn add_node(&mut self, node: Node) -> Result<usize> {
        if self.index.contains_key(&node.id) {
            return Err(StrandError::DuplicateNode(node.id));
        }
        let idx = self.slots.len();
        self.index.insert(node.id.clone(), idx);
        self.slots.push(Some(node));
        Ok(idx)
    }

    /// Drop a node's slot. Incident edges must already be gone.
    pub(crate) fn take_node(&mut self, id: &str) -> Option<Node> {
        let idx = self.index.remove(id)?;
        self.slots.get_mut(idx).and_then(Option::take)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node_at(&self, idx: usize) -> Option<&Node> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_of(id).and_then(|idx| self.node_at(idx))
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        let idx = self.index_of(id)?;
        self.slots.get_mut(idx).and_then(Option::as_mut)
    }

    /// Like [`node`](Self::node), but a missing id is an error.
    pub fn get(&self, id: &str) -> Result<&Node> {
        self.node(id)
            .ok_or_else(|| StrandError::NodeNotFound(id.to_string()))
    }

    /// Live nodes in slot order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.slots.iter().flatten()
    }

    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub(crate) fn edge_mut(&mut self, id: &str) -> Option<&mut Edge> {
        self.edges.iter_mut().find(|e| e.id == id)
    }

    pub fn find_edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|e| e.source == source && e.target == target)
    }

    pub(crate) fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    pub(crate) fn take_edge(&mut self, id: &str) -> Option<Edge> {
        let pos = self.edges.iter().position(|e| e.id == id)?;
        Some(self.edges.remove(pos))
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == id)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == id)
    }

    /// Targets of outgoing edges, in edge order.
    pub fn children(&self, id: &str) -> Vec<&Node> {
        self.outgoing(id)
            .filter_map(|e| self.node(&e.target))
            .collect()
    }

    /// Sources of incoming edges, in edge order.
    pub fn parents(&self, id: &str) -> Vec<&Node> {
        self.incoming(id)
            .filter_map(|e| self.node(&e.source))
            .collect()
    }

    pub fn start_nodes(&self) -> Vec<&Node> {
        self.nodes().filter(|n| n.kind == NodeKind::Start).collect()
    }

    /// Every node reachable from `id` (itself included), breadth first.
    pub fn reachable_from(&self, id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id.to_string()]);

        while let Some(current) = queue.pop_front() {
            if !self.contains(&current) || !seen.insert(current.clone()) {
                continue;
            }
            for edge in self.outgoing(&current) {
                queue.push_back(edge.target.clone());
            }
            order.push(current);
        }
        order
    }
}
