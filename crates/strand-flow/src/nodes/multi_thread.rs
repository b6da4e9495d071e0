use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use strand_core::error::Result;

use super::name_field;
use crate::graph::{Node, NodeKind};
use crate::registry::{NodeBehavior, NodeMetadata, OutputField, ProcessScope};

/// Fan-out: continues into every outgoing branch concurrently.
pub struct MultiThreadNode;

impl NodeBehavior for MultiThreadNode {
    fn kind(&self) -> NodeKind {
        NodeKind::MultiThread
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            kind: NodeKind::MultiThread,
            name: "Multi Thread",
            description: "Runs every outgoing branch in parallel, each on its own thread",
        }
    }

    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>> {
        Box::pin(async move {
            let next = scope.all_outgoing();
            debug!(node_id = %scope.node.id, branches = next.len(), "Fanning out");
            scope.context.set_output(
                &scope.node.id,
                json!({
                    "name": scope.node.display_name(),
                    "branches": next.len(),
                }),
            );
            Ok(next)
        })
    }

    fn outputs(&self, _node: &Node) -> Vec<OutputField> {
        vec![
            name_field(),
            OutputField::new("branches", "Branches", "Number of branches started"),
        ]
    }
}
