use std::collections::{HashSet, VecDeque};

use strand_core::error::Result;

use crate::graph::{FlowGraph, NodeKind};
use crate::registry::NodeRegistry;

/// Placeholders a node can reference: the outputs of every node upstream of
/// it, nearest first.
///
/// Walks incoming edges backwards from `node_id`, not past the start node.
/// Nodes whose values live under a shared key (such as `state`) contribute
/// each field once.
pub fn available_values(
    graph: &FlowGraph,
    registry: &NodeRegistry,
    node_id: &str,
) -> Result<Vec<String>> {
    graph.get(node_id)?;

    let mut seen = HashSet::from([node_id.to_string()]);
    let mut queue: VecDeque<&str> = graph.incoming(node_id).map(|e| e.source.as_str()).collect();
    let mut values = Vec::new();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.to_string()) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        if let Some(behavior) = registry.behavior(node.kind) {
            let key = behavior
                .value_identifier(node)
                .unwrap_or_else(|| node.id.clone());
            for field in behavior.outputs(node) {
                let placeholder = format!("{{{key}.{}}}", field.name);
                if !values.contains(&placeholder) {
                    values.push(placeholder);
                }
            }
        }
        if node.kind != NodeKind::Start {
            queue.extend(graph.incoming(id).map(|e| e.source.as_str()));
        }
    }
    Ok(values)
}
