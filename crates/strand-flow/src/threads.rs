//! Thread tag maintenance.
//!
//! Every node carries a `thread` tag naming the logical lane it runs on, and
//! a `parentId` naming the node it inherited that tag from. A child shares
//! its structural parent's tag, except that each branch of a fan-out gets a
//! fresh tag and a merge takes the tag of the fan-out it closes.
//!
//! [`ThreadMaintainer`] keeps this true across edits. Edges that can no
//! longer be made consistent are deleted rather than reported as errors.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use strand_core::error::{Result, StrandError};

use crate::graph::{Edge, FlowGraph, Node, NodeKind};
use crate::registry::NodeRegistry;

/// What an edit changed besides the edit itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphChange {
    /// Nodes whose tag or parent was rewritten, in order of first change.
    pub retagged: Vec<String>,
    /// Edges removed: on disconnect the requested one first, then pruned ones.
    pub removed_edges: Vec<Edge>,
    /// Ids of removed edges whose decision metadata was dropped.
    pub dropped_metadata: Vec<String>,
}

impl GraphChange {
    fn note(&mut self, ids: &[String]) {
        for id in ids {
            if !self.retagged.contains(id) {
                self.retagged.push(id.clone());
            }
        }
    }
}

/// A tag no other node uses.
pub fn fresh_tag() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("t{}", &id[..8])
}

/// Keeps thread tags consistent while edges are added and removed.
pub struct ThreadMaintainer {
    registry: Arc<NodeRegistry>,
}

impl ThreadMaintainer {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Validate a prospective edge without changing the graph.
    pub fn check_connection(&self, graph: &FlowGraph, source: &str, target: &str) -> Result<()> {
        let reject = |reason: &str| StrandError::InvalidConnection {
            source_id: source.to_string(),
            target_id: target.to_string(),
            reason: reason.to_string(),
        };
        if source == target {
            return Err(reject("a node cannot connect to itself"));
        }
        let src = graph.get(source)?;
        let dst = graph.get(target)?;
        if graph.find_edge(source, target).is_some() {
            return Err(reject("the nodes are already connected"));
        }
        if dst.kind == NodeKind::Start {
            return Err(reject("the start node cannot have incoming edges"));
        }
        if !src.kind.is_branching() && graph.outgoing(source).next().is_some() {
            return Err(reject("only fan-out and decision nodes have several outgoing edges"));
        }
        if src.kind.is_branching() || graph.incoming(target).next().is_none() {
            return Ok(());
        }
        if dst.kind.is_merge() {
            return match nearest_fan_out(graph, source) {
                Some(fan_out) if fan_out.thread() == dst.thread() => Ok(()),
                _ => Err(reject("the merge closes a different fan-out")),
            };
        }
        if src.thread() == dst.thread() {
            Ok(())
        } else {
            Err(reject("the nodes run on different threads"))
        }
    }

    /// [`check_connection`](Self::check_connection), then
    /// [`connect`](Self::connect).
    pub fn try_connect(&self, graph: &mut FlowGraph, edge: Edge) -> Result<GraphChange> {
        self.check_connection(graph, &edge.source, &edge.target)?;
        self.connect(graph, edge)
    }

    /// Insert an edge and restore tag consistency.
    pub fn connect(&self, graph: &mut FlowGraph, edge: Edge) -> Result<GraphChange> {
        if edge.source == edge.target {
            return Err(StrandError::InvalidConnection {
                source_id: edge.source.clone(),
                target_id: edge.target.clone(),
                reason: "a node cannot connect to itself".into(),
            });
        }
        graph.get(&edge.source)?;
        graph.get(&edge.target)?;
        if graph.edge(&edge.id).is_some() {
            return Err(StrandError::InvalidConnection {
                source_id: edge.source.clone(),
                target_id: edge.target.clone(),
                reason: format!("edge id '{}' is already used", edge.id),
            });
        }

        let mut change = GraphChange::default();
        let retagged = self.attach(graph, edge);
        change.note(&retagged);
        let pruned = inconsistent_edges(graph, &retagged);
        self.remove_edges(graph, pruned, &mut change);
        debug!(
            retagged = change.retagged.len(),
            pruned = change.removed_edges.len(),
            "Edge connected"
        );
        Ok(change)
    }

    /// Remove an edge and restore tag consistency, pruning edges that
    /// cannot be kept.
    pub fn disconnect(&self, graph: &mut FlowGraph, edge_id: &str) -> Result<GraphChange> {
        if graph.edge(edge_id).is_none() {
            return Err(StrandError::EdgeNotFound(edge_id.to_string()));
        }
        let mut change = GraphChange::default();
        self.remove_edges(graph, vec![edge_id.to_string()], &mut change);
        debug!(
            edge_id,
            retagged = change.retagged.len(),
            removed = change.removed_edges.len(),
            "Edge disconnected"
        );
        Ok(change)
    }

    /// Remove a node together with its edges.
    pub fn remove_node(&self, graph: &mut FlowGraph, node_id: &str) -> Result<GraphChange> {
        graph.get(node_id)?;
        // Outgoing first, so the removed node's own subtree isn't retagged twice.
        let mut ids: Vec<String> = graph.outgoing(node_id).map(|e| e.id.clone()).collect();
        ids.extend(
            graph
                .incoming(node_id)
                .filter(|e| e.source != node_id)
                .map(|e| e.id.clone()),
        );
        let mut change = GraphChange::default();
        self.remove_edges(graph, ids, &mut change);
        graph.take_node(node_id);
        change.retagged.retain(|id| id != node_id);
        let settled = self.settle_merges(graph);
        change.note(&settled);
        Ok(change)
    }

    /// Recompute every tag from scratch by replaying the edges in order.
    /// Used after importing a document whose tags can't be trusted.
    pub fn rebuild(&self, graph: &mut FlowGraph) -> GraphChange {
        let edges: Vec<Edge> = graph.edges().to_vec();
        let ids: Vec<String> = graph.nodes().map(|n| n.id.clone()).collect();
        for edge in &edges {
            graph.take_edge(&edge.id);
        }
        for id in &ids {
            let has_incoming = edges.iter().any(|e| &e.target == id);
            if let Some(node) = graph.node_mut(id) {
                node.data.thread = if has_incoming {
                    String::new()
                } else {
                    fresh_tag()
                };
                node.data.parent_id = None;
            }
        }

        let mut change = GraphChange::default();
        for edge in edges {
            if !graph.contains(&edge.source) || !graph.contains(&edge.target) {
                continue;
            }
            let retagged = self.attach(graph, edge);
            change.note(&retagged);
        }
        let settled = self.settle_merges(graph);
        change.note(&settled);

        let pruned = graph
            .edges()
            .iter()
            .filter(|e| !edge_consistent(graph, e))
            .map(|e| e.id.clone())
            .collect();
        self.remove_edges(graph, pruned, &mut change);
        change.retagged = ids
            .into_iter()
            .filter(|id| graph.contains(id))
            .collect();
        change
    }

    /// Push an edge and retag its target when needed. Returns retagged ids.
    fn attach(&self, graph: &mut FlowGraph, mut edge: Edge) -> Vec<String> {
        let Some(source) = graph.node(&edge.source) else {
            return vec![];
        };
        let source_id = source.id.clone();
        let fan_out = source.kind.is_fan_out();
        let source_thread = source.thread().to_string();
        if let Some(behavior) = self.registry.behavior(source.kind) {
            behavior.on_connect(&mut edge);
        }
        let target_id = edge.target.clone();
        graph.push_edge(edge);

        let Some(target) = graph.node(&target_id) else {
            return vec![];
        };
        let consistent = if target.kind.is_merge() {
            true
        } else if fan_out {
            target.parent_id() == Some(source_id.as_str())
        } else {
            is_anchored(graph, target) && target.thread() == source_thread
        };

        let mut retagged = Vec::new();
        if !consistent {
            let candidate = if fan_out { fresh_tag() } else { source_thread };
            retagged = propagate(graph, &target_id, &candidate, Some(&source_id));
        }
        retagged.extend(self.settle_merges(graph));
        retagged
    }

    /// Drain a worklist of edge ids, retagging what each removal orphans and
    /// queueing edges that become inconsistent.
    fn remove_edges(&self, graph: &mut FlowGraph, ids: Vec<String>, change: &mut GraphChange) {
        let mut queue: VecDeque<String> = ids.into();
        loop {
            while let Some(id) = queue.pop_front() {
                let Some(mut edge) = graph.take_edge(&id) else {
                    continue;
                };
                if let Some(source) = graph.node(&edge.source) {
                    let had_metadata = edge.data.is_some();
                    if let Some(behavior) = self.registry.behavior(source.kind) {
                        behavior.on_disconnect(&mut edge);
                    }
                    if had_metadata && edge.data.is_none() {
                        change.dropped_metadata.push(edge.id.clone());
                    }
                }

                let structural = graph.node(&edge.target).is_some_and(|target| {
                    !target.kind.is_merge() && target.parent_id() == Some(edge.source.as_str())
                });
                let target_id = edge.target.clone();
                change.removed_edges.push(edge);
                if !structural {
                    continue;
                }

                let retagged = reanchor(graph, &target_id);
                change.note(&retagged);
                for id in inconsistent_edges(graph, &retagged) {
                    if !queue.contains(&id) {
                        queue.push_back(id);
                    }
                }
            }

            let settled = self.settle_merges(graph);
            change.note(&settled);
            queue.extend(inconsistent_edges(graph, &settled));
            if queue.is_empty() {
                break;
            }
        }
    }

    /// Re-resolve every merge until nothing changes. Returns retagged ids.
    fn settle_merges(&self, graph: &mut FlowGraph) -> Vec<String> {
        let mut retagged = Vec::new();
        for _ in 0..=graph.node_count() {
            let merges: Vec<String> = graph
                .nodes()
                .filter(|n| n.kind.is_merge())
                .map(|n| n.id.clone())
                .collect();
            let mut changed = false;

            for id in merges {
                let (thread, parent) = resolve_merge(graph, &id);
                let Some(node) = graph.node_mut(&id) else {
                    continue;
                };
                if node.data.thread == thread && node.data.parent_id == parent {
                    continue;
                }
                node.data.thread = thread.clone();
                node.data.parent_id = parent;
                changed = true;
                retagged.push(id.clone());

                let children: Vec<String> = graph.outgoing(&id).map(|e| e.target.clone()).collect();
                for child in children {
                    let eligible = graph.node(&child).is_some_and(|c| {
                        !c.kind.is_merge()
                            && (c.parent_id() == Some(id.as_str()) || !is_anchored(graph, c))
                    });
                    if eligible {
                        retagged.extend(propagate(graph, &child, &thread, Some(&id)));
                    }
                }
            }
            if !changed {
                break;
            }
        }
        retagged
    }
}

/// Whether the node's recorded parent still has an edge into it.
fn is_anchored(graph: &FlowGraph, node: &Node) -> bool {
    node.parent_id()
        .is_some_and(|parent| graph.find_edge(parent, &node.id).is_some())
}

/// Tag `root` and everything below it that inherits from it.
///
/// Depth first with a visited set. Fan-outs are retagged but not descended
/// into; merges are left to [`ThreadMaintainer::settle_merges`]. A child is
/// only entered when it is anchored to the node it is reached from or not
/// anchored at all.
fn propagate(graph: &mut FlowGraph, root: &str, thread: &str, parent: Option<&str>) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut retagged = Vec::new();
    let mut stack = vec![(root.to_string(), parent.map(str::to_string))];

    while let Some((id, parent)) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(node) = graph.node_mut(&id) else {
            continue;
        };
        if node.kind.is_merge() {
            continue;
        }
        node.data.thread = thread.to_string();
        node.data.parent_id = parent;
        let fan_out = node.kind.is_fan_out();
        retagged.push(id.clone());
        if fan_out {
            continue;
        }

        let children: Vec<String> = graph.outgoing(&id).map(|e| e.target.clone()).collect();
        for child in children.into_iter().rev() {
            if visited.contains(&child) {
                continue;
            }
            let eligible = graph.node(&child).is_some_and(|c| {
                c.parent_id() == Some(id.as_str()) || !is_anchored(graph, c)
            });
            if eligible {
                stack.push((child, Some(id.clone())));
            }
        }
    }
    retagged
}

/// Re-anchor a node that lost its structural parent: on its first remaining
/// incoming edge, or on a brand-new tag when none is left.
fn reanchor(graph: &mut FlowGraph, node_id: &str) -> Vec<String> {
    let anchor = graph
        .incoming(node_id)
        .next()
        .and_then(|e| graph.node(&e.source))
        .map(|source| {
            let tag = if source.kind.is_fan_out() {
                fresh_tag()
            } else {
                source.thread().to_string()
            };
            (tag, source.id.clone())
        });
    match anchor {
        Some((tag, parent)) => propagate(graph, node_id, &tag, Some(&parent)),
        None => propagate(graph, node_id, &fresh_tag(), None),
    }
}

/// Whether an edge satisfies the tag invariant.
pub fn edge_consistent(graph: &FlowGraph, edge: &Edge) -> bool {
    let (Some(source), Some(target)) = (graph.node(&edge.source), graph.node(&edge.target)) else {
        return false;
    };
    if target.kind.is_merge() {
        true
    } else if source.kind.is_fan_out() {
        target.parent_id() == Some(source.id.as_str())
    } else {
        source.thread() == target.thread()
    }
}

/// Inconsistent edges touching any of `ids`.
fn inconsistent_edges(graph: &FlowGraph, ids: &[String]) -> Vec<String> {
    if ids.is_empty() {
        return vec![];
    }
    let touched: HashSet<&str> = ids.iter().map(String::as_str).collect();
    graph
        .edges()
        .iter()
        .filter(|e| touched.contains(e.source.as_str()) || touched.contains(e.target.as_str()))
        .filter(|e| !edge_consistent(graph, e))
        .map(|e| e.id.clone())
        .collect()
}

/// Tag and parent a merge should have: those of the nearest fan-out behind
/// its incoming edges, tried in edge order.
fn resolve_merge(graph: &FlowGraph, merge_id: &str) -> (String, Option<String>) {
    let sources: Vec<&str> = graph.incoming(merge_id).map(|e| e.source.as_str()).collect();
    for source in &sources {
        if let Some(fan_out) = nearest_fan_out(graph, source) {
            return (fan_out.thread().to_string(), Some(fan_out.id.clone()));
        }
    }
    if let Some(first) = sources.first().and_then(|id| graph.node(id)) {
        return (first.thread().to_string(), Some(first.id.clone()));
    }
    match graph.node(merge_id) {
        Some(node) if !node.thread().is_empty() && node.parent_id().is_none() => {
            (node.thread().to_string(), None)
        }
        _ => (fresh_tag(), None),
    }
}

/// Walk `parentId` links from `start` to the first fan-out. A merge on the
/// way is skipped together with the fan-out it closes.
pub fn nearest_fan_out<'g>(graph: &'g FlowGraph, start: &str) -> Option<&'g Node> {
    let mut seen = HashSet::new();
    let mut current = graph.node(start);
    while let Some(node) = current {
        if !seen.insert(node.id.as_str()) {
            return None;
        }
        if node.kind.is_fan_out() {
            return Some(node);
        }
        let next = if node.kind.is_merge() {
            match node.parent_id().and_then(|p| graph.node(p)) {
                Some(closed) if closed.kind.is_fan_out() => closed.parent_id(),
                Some(other) => Some(other.id.as_str()),
                None => None,
            }
        } else {
            node.parent_id()
        };
        current = next.and_then(|id| graph.node(id));
    }
    None
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::graph::{DecisionMeta, FlowDocument};
    use strand_core::config::ModelConfig;
    use strand_core::pricing::PriceTable;
    use strand_llm::FakeChatClient;

    fn maintainer() -> ThreadMaintainer {
        ThreadMaintainer::new(Arc::new(NodeRegistry::with_builtins(
            Arc::new(FakeChatClient::new("ok", Duration::ZERO)),
            ModelConfig::default(),
            PriceTable::default(),
        )))
    }

    fn graph(nodes: &[(&str, NodeKind)]) -> FlowGraph {
        let mut graph = FlowGraph::new();
        for (id, kind) in nodes {
            let mut node = Node::new(*id, *kind);
            node.data.thread = fresh_tag();
            graph.add_node(node).unwrap();
        }
        graph
    }

    fn link(m: &ThreadMaintainer, g: &mut FlowGraph, s: &str, t: &str) -> GraphChange {
        m.connect(g, Edge::new(s, t)).unwrap()
    }

    fn thread<'a>(g: &'a FlowGraph, id: &str) -> &'a str {
        g.node(id).unwrap().thread()
    }

    fn parent<'a>(g: &'a FlowGraph, id: &str) -> Option<&'a str> {
        g.node(id).unwrap().parent_id()
    }

    /// s -> fan -> {a, b} -> merge -> after
    fn diamond(m: &ThreadMaintainer) -> FlowGraph {
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("fan", NodeKind::MultiThread),
            ("a", NodeKind::Prompt),
            ("b", NodeKind::ConsoleLog),
            ("merge", NodeKind::ThreadMerge),
            ("after", NodeKind::ConsoleLog),
        ]);
        for (s, t) in [
            ("s", "fan"),
            ("fan", "a"),
            ("fan", "b"),
            ("a", "merge"),
            ("b", "merge"),
            ("merge", "after"),
        ] {
            link(m, &mut g, s, t);
        }
        g
    }

    fn assert_consistent(g: &FlowGraph) {
        for edge in g.edges() {
            assert!(edge_consistent(g, edge), "inconsistent edge {}", edge.id);
        }
    }

    #[test]
    fn test_chain_inherits_tag() {
        let m = maintainer();
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("x", NodeKind::Prompt),
            ("y", NodeKind::SetState),
        ]);
        link(&m, &mut g, "s", "x");
        let change = link(&m, &mut g, "x", "y");
        assert_eq!(change.retagged, vec!["y"]);
        assert_eq!(thread(&g, "y"), thread(&g, "s"));
        assert_eq!(parent(&g, "y"), Some("x"));
    }

    #[test]
    fn test_fan_out_branches_get_fresh_tags() {
        let m = maintainer();
        let g = diamond(&m);
        let fan = thread(&g, "fan");
        assert_eq!(fan, thread(&g, "s"));
        assert_ne!(thread(&g, "a"), fan);
        assert_ne!(thread(&g, "b"), fan);
        assert_ne!(thread(&g, "a"), thread(&g, "b"));
        assert_eq!(parent(&g, "a"), Some("fan"));
        assert_eq!(parent(&g, "b"), Some("fan"));
        assert_consistent(&g);
    }

    #[test]
    fn test_merge_takes_fan_out_tag() {
        let m = maintainer();
        let g = diamond(&m);
        assert_eq!(thread(&g, "merge"), thread(&g, "fan"));
        assert_eq!(parent(&g, "merge"), Some("fan"));
        assert_eq!(thread(&g, "after"), thread(&g, "fan"));
        assert_eq!(parent(&g, "after"), Some("merge"));
    }

    #[test]
    fn test_nested_merge_skips_inner_fan_out() {
        let m = maintainer();
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("outer", NodeKind::MultiThread),
            ("x", NodeKind::Prompt),
            ("inner", NodeKind::MultiThread),
            ("p", NodeKind::Prompt),
            ("q", NodeKind::Prompt),
            ("inner_merge", NodeKind::ThreadMerge),
            ("y", NodeKind::Prompt),
            ("outer_merge", NodeKind::ThreadMerge),
        ]);
        for (s, t) in [
            ("s", "outer"),
            ("outer", "x"),
            ("outer", "y"),
            ("x", "inner"),
            ("inner", "p"),
            ("inner", "q"),
            ("p", "inner_merge"),
            ("q", "inner_merge"),
            ("inner_merge", "outer_merge"),
            ("y", "outer_merge"),
        ] {
            link(&m, &mut g, s, t);
        }
        assert_eq!(parent(&g, "inner_merge"), Some("inner"));
        assert_eq!(thread(&g, "inner_merge"), thread(&g, "x"));
        assert_eq!(parent(&g, "outer_merge"), Some("outer"));
        assert_eq!(thread(&g, "outer_merge"), thread(&g, "s"));
    }

    #[test]
    fn test_disconnect_gives_subtree_one_new_tag() {
        let m = maintainer();
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("x", NodeKind::Prompt),
            ("y", NodeKind::SetState),
        ]);
        link(&m, &mut g, "s", "x");
        link(&m, &mut g, "x", "y");
        let old = thread(&g, "s").to_string();

        let change = m.disconnect(&mut g, "s->x").unwrap();
        assert_eq!(change.removed_edges.len(), 1);
        assert_ne!(thread(&g, "x"), old);
        assert_eq!(thread(&g, "x"), thread(&g, "y"));
        assert_eq!(parent(&g, "x"), None);
        assert_eq!(parent(&g, "y"), Some("x"));
    }

    #[test]
    fn test_disconnect_reanchors_on_remaining_edge() {
        let m = maintainer();
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("d", NodeKind::Decision),
            ("x", NodeKind::Prompt),
            ("w", NodeKind::Prompt),
            ("y", NodeKind::ConsoleLog),
        ]);
        link(&m, &mut g, "s", "d");
        link(&m, &mut g, "d", "x");
        link(&m, &mut g, "d", "w");
        link(&m, &mut g, "x", "y");
        link(&m, &mut g, "w", "y");
        assert_eq!(parent(&g, "y"), Some("x"));

        m.disconnect(&mut g, "x->y").unwrap();
        assert_eq!(parent(&g, "y"), Some("w"));
        assert_eq!(thread(&g, "y"), thread(&g, "w"));
    }

    #[test]
    fn test_disconnect_prunes_in_cascade() {
        let m = maintainer();
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("d", NodeKind::Decision),
            ("x", NodeKind::Prompt),
            ("w", NodeKind::Prompt),
            ("y", NodeKind::ConsoleLog),
        ]);
        link(&m, &mut g, "s", "d");
        link(&m, &mut g, "d", "x");
        link(&m, &mut g, "d", "w");
        link(&m, &mut g, "x", "y");
        link(&m, &mut g, "w", "y");

        let change = m.disconnect(&mut g, "d->x").unwrap();
        let removed: Vec<&str> = change.removed_edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(removed, vec!["d->x", "w->y"]);
        assert_eq!(change.dropped_metadata, vec!["d->x"]);
        assert_eq!(thread(&g, "x"), thread(&g, "y"));
        assert_ne!(thread(&g, "x"), thread(&g, "d"));
        assert_consistent(&g);
    }

    #[test]
    fn test_connect_prunes_displaced_anchor() {
        let m = maintainer();
        let mut g = diamond(&m);
        let change = link(&m, &mut g, "b", "a");
        assert_eq!(parent(&g, "a"), Some("b"));
        assert_eq!(thread(&g, "a"), thread(&g, "b"));
        let removed: Vec<&str> = change.removed_edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(removed, vec!["fan->a"]);
        assert_consistent(&g);
    }

    #[test]
    fn test_cycle_terminates() {
        let m = maintainer();
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("a", NodeKind::Prompt),
            ("b", NodeKind::SetState),
        ]);
        link(&m, &mut g, "s", "a");
        link(&m, &mut g, "a", "b");
        link(&m, &mut g, "b", "a");
        assert_eq!(parent(&g, "a"), Some("s"));
        assert_eq!(thread(&g, "b"), thread(&g, "s"));

        m.disconnect(&mut g, "s->a").unwrap();
        assert!(g.edge("b->a").is_some());
        assert_eq!(parent(&g, "a"), Some("b"));
        assert_eq!(thread(&g, "a"), thread(&g, "b"));
    }

    #[test]
    fn test_decision_metadata_lifecycle() {
        let m = maintainer();
        let mut g = graph(&[("d", NodeKind::Decision), ("x", NodeKind::Prompt)]);
        link(&m, &mut g, "d", "x");
        assert_eq!(g.edge("d->x").unwrap().data, Some(DecisionMeta::pending()));

        let change = m.disconnect(&mut g, "d->x").unwrap();
        assert_eq!(change.dropped_metadata, vec!["d->x"]);
        assert!(change.removed_edges[0].data.is_none());
    }

    #[test]
    fn test_misuse_is_an_error() {
        let m = maintainer();
        let mut g = graph(&[("a", NodeKind::Prompt)]);
        assert!(matches!(
            m.connect(&mut g, Edge::new("a", "a")),
            Err(StrandError::InvalidConnection { .. })
        ));
        assert!(matches!(
            m.connect(&mut g, Edge::new("a", "ghost")),
            Err(StrandError::NodeNotFound(_))
        ));
        assert!(matches!(
            m.disconnect(&mut g, "nope"),
            Err(StrandError::EdgeNotFound(_))
        ));
    }

    #[test]
    fn test_check_connection() {
        let m = maintainer();
        let mut g = diamond(&m);
        g.add_node(Node::new("lone", NodeKind::Prompt)).unwrap();

        assert!(m.check_connection(&g, "a", "a").is_err());
        assert!(m.check_connection(&g, "s", "fan").is_err(), "duplicate");
        assert!(m.check_connection(&g, "after", "s").is_err(), "into start");
        assert!(m.check_connection(&g, "s", "lone").is_err(), "second outgoing");
        assert!(m.check_connection(&g, "fan", "lone").is_ok());
        assert!(m.check_connection(&g, "after", "lone").is_ok());
        assert!(m.check_connection(&g, "a", "b").is_err(), "a already has an outgoing edge");
        assert!(m.check_connection(&g, "lone", "after").is_err(), "other lane");
        assert!(m.check_connection(&g, "lone", "ghost").is_err());
    }

    #[test]
    fn test_check_connection_into_merge() {
        let m = maintainer();
        let mut g = diamond(&m);
        m.disconnect(&mut g, "b->merge").unwrap();
        assert!(m.check_connection(&g, "b", "merge").is_ok());

        g.add_node(Node::new("stray", NodeKind::Prompt)).unwrap();
        assert!(m.check_connection(&g, "stray", "merge").is_err());
    }

    #[test]
    fn test_try_connect_leaves_graph_untouched_on_rejection() {
        let m = maintainer();
        let mut g = diamond(&m);
        let before = g.to_document();
        assert!(m.try_connect(&mut g, Edge::new("a", "b")).is_err());
        assert_eq!(g.to_document(), before);
    }

    #[test]
    fn test_remove_node() {
        let m = maintainer();
        let mut g = graph(&[
            ("s", NodeKind::Start),
            ("x", NodeKind::Prompt),
            ("y", NodeKind::SetState),
        ]);
        link(&m, &mut g, "s", "x");
        link(&m, &mut g, "x", "y");

        let change = m.remove_node(&mut g, "x").unwrap();
        assert!(!g.contains("x"));
        assert!(g.edges().is_empty());
        assert_eq!(change.removed_edges.len(), 2);
        assert!(!change.retagged.contains(&"x".to_string()));
        assert_ne!(thread(&g, "y"), thread(&g, "s"));
        assert_eq!(parent(&g, "y"), None);
    }

    #[test]
    fn test_rebuild_imported_document() {
        let m = maintainer();
        let doc = FlowDocument {
            nodes: vec![
                Node::new("after", NodeKind::ConsoleLog),
                Node::new("merge", NodeKind::ThreadMerge),
                Node::new("b", NodeKind::ConsoleLog),
                Node::new("a", NodeKind::Prompt),
                Node::new("fan", NodeKind::MultiThread),
                Node::new("s", NodeKind::Start),
            ],
            edges: vec![
                Edge::new("merge", "after"),
                Edge::new("a", "merge"),
                Edge::new("b", "merge"),
                Edge::new("fan", "a"),
                Edge::new("fan", "b"),
                Edge::new("s", "fan"),
            ],
        };
        let mut g = FlowGraph::from_document(doc).unwrap();
        let change = m.rebuild(&mut g);

        assert_eq!(change.retagged.len(), 6);
        assert!(change.removed_edges.is_empty());
        assert_eq!(g.edges().len(), 6);
        assert!(g.nodes().all(|n| !n.thread().is_empty()));
        assert_eq!(thread(&g, "fan"), thread(&g, "s"));
        assert_ne!(thread(&g, "a"), thread(&g, "b"));
        assert_eq!(thread(&g, "merge"), thread(&g, "s"));
        assert_eq!(parent(&g, "merge"), Some("fan"));
        assert_eq!(thread(&g, "after"), thread(&g, "s"));
        assert_consistent(&g);
    }

    #[test]
    fn test_nearest_fan_out() {
        let m = maintainer();
        let g = diamond(&m);
        assert_eq!(nearest_fan_out(&g, "a").map(|n| n.id.as_str()), Some("fan"));
        assert_eq!(nearest_fan_out(&g, "after"), None);
        assert_eq!(nearest_fan_out(&g, "s"), None);
    }
}
