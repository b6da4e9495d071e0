//! Copy and paste of graph fragments.

use std::collections::HashMap;

use rand::Rng;
use tracing::debug;

use strand_core::error::Result;

use crate::graph::{Edge, FlowDocument, FlowGraph, NodeKind};

/// The selected nodes, minus start nodes, and the edges between them.
pub fn copy<S: AsRef<str>>(graph: &FlowGraph, ids: &[S]) -> FlowDocument {
    let nodes: Vec<_> = ids
        .iter()
        .filter_map(|id| graph.node(id.as_ref()))
        .filter(|node| node.kind != NodeKind::Start)
        .cloned()
        .collect();
    let edges = graph
        .edges()
        .iter()
        .filter(|e| {
            nodes.iter().any(|n| n.id == e.source) && nodes.iter().any(|n| n.id == e.target)
        })
        .cloned()
        .collect();
    FlowDocument { nodes, edges }
}

/// Insert a copied fragment under fresh ids and return the new node ids.
///
/// Start nodes are dropped. Parents outside the fragment are cleared, and
/// every thread tag gets one shared random suffix so the fragment's lanes
/// stay distinct from the originals while keeping their internal structure.
/// Edges with an endpoint outside the fragment are dropped.
pub fn paste(graph: &mut FlowGraph, fragment: &FlowDocument) -> Result<Vec<String>> {
    let mut rng = rand::thread_rng();
    let suffix = format!("{:03x}", rng.gen_range(0..0x1000u32));

    let mut ids = HashMap::new();
    for node in fragment.nodes.iter().filter(|n| n.kind != NodeKind::Start) {
        let new_id = loop {
            let candidate = format!("{}_{:08x}", node.kind, rng.gen::<u32>());
            if !graph.contains(&candidate) && !ids.values().any(|v| v == &candidate) {
                break candidate;
            }
        };
        ids.insert(node.id.clone(), new_id);
    }

    let mut created = Vec::new();
    for node in fragment.nodes.iter().filter(|n| n.kind != NodeKind::Start) {
        let Some(new_id) = ids.get(&node.id) else {
            continue;
        };
        let mut pasted = node.clone();
        pasted.id = new_id.clone();
        pasted.data.parent_id = node.parent_id().and_then(|p| ids.get(p)).cloned();
        pasted.data.thread = format!("{}_{suffix}", node.thread());
        graph.add_node(pasted)?;
        created.push(new_id.clone());
    }

    for edge in &fragment.edges {
        let (Some(source), Some(target)) = (ids.get(&edge.source), ids.get(&edge.target)) else {
            continue;
        };
        let mut pasted = Edge::new(source.clone(), target.clone())
            .with_id(format!("edge_{:08x}", rng.gen::<u32>()));
        pasted.data = edge.data.clone();
        graph.push_edge(pasted);
    }

    debug!(nodes = created.len(), "Pasted fragment");
    Ok(created)
}
