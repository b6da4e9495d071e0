use futures::future::BoxFuture;
use serde_json::json;
use tracing::debug;

use strand_core::error::{Result, StrandError};

use super::name_field;
use crate::graph::{Node, NodeKind};
use crate::registry::{NodeBehavior, NodeMetadata, OutputField, ProcessScope};

/// Barrier: waits until every incoming node has completed or failed.
///
/// Incoming nodes that never start stay `waiting`, so a barrier behind an
/// unselected decision branch only releases through the merge timeout.
pub struct ThreadMergeNode;

impl NodeBehavior for ThreadMergeNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ThreadMerge
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            kind: NodeKind::ThreadMerge,
            name: "Thread Merge",
            description: "Waits until all connected parallel threads end",
        }
    }

    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>> {
        Box::pin(async move {
            let node = scope.node;
            let incoming: Vec<String> = scope.incoming.iter().map(|n| n.id.clone()).collect();
            debug!(node_id = %node.id, incoming = incoming.len(), "Waiting for incoming branches");

            let mut states = scope.states.clone();
            let wait = states.wait_resolved(&incoming);
            match scope.merge_timeout {
                Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                    StrandError::MergeTimeout {
                        node_id: node.id.clone(),
                        timeout_secs: limit.as_secs(),
                    }
                })??,
                None => wait.await?,
            }

            debug!(node_id = %node.id, "Incoming branches resolved");
            scope.context.set_output(
                &node.id,
                json!({
                    "name": node.display_name(),
                    "merged": incoming,
                }),
            );
            Ok(scope.all_outgoing())
        })
    }

    fn outputs(&self, _node: &Node) -> Vec<OutputField> {
        vec![
            name_field(),
            OutputField::new("merged", "Merged nodes", "Ids of the incoming nodes joined here"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::graph::{Edge, FlowDocument};
    use crate::nodes::testing::Harness;
    use strand_core::types::NodeState;

    fn harness() -> Harness {
        Harness::new(FlowDocument {
            nodes: vec![
                Node::new("a", NodeKind::ConsoleLog),
                Node::new("b", NodeKind::ConsoleLog),
                Node::new("merge", NodeKind::ThreadMerge),
                Node::new("after", NodeKind::ConsoleLog),
            ],
            edges: vec![
                Edge::new("a", "merge"),
                Edge::new("b", "merge"),
                Edge::new("merge", "after"),
            ],
        })
    }

    #[tokio::test]
    async fn test_blocks_while_a_branch_is_running() {
        let harness = harness();
        harness.store.set_state("a", NodeState::Completed);
        harness.store.set_state("b", NodeState::Running);

        let result = tokio::time::timeout(
            Duration::from_millis(100),
            ThreadMergeNode.process(harness.scope("merge")),
        )
        .await;
        assert!(result.is_err(), "barrier released while b was running");
    }

    #[tokio::test]
    async fn test_releases_when_all_resolved() {
        let harness = harness();
        harness.store.set_state("a", NodeState::Completed);
        harness.store.set_state("b", NodeState::Running);

        let store = harness.store.clone();
        let finisher = async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            store.set_state("b", NodeState::Failed);
        };
        let (next, _) = tokio::join!(ThreadMergeNode.process(harness.scope("merge")), finisher);
        assert_eq!(Harness::ids(&next.unwrap()), vec!["after"]);
        harness.context.read(|ctx| {
            assert_eq!(ctx.get_path("merge.merged").unwrap(), &serde_json::json!(["a", "b"]));
        });
    }

    #[tokio::test]
    async fn test_times_out() {
        let harness = harness();
        harness.store.set_state("a", NodeState::Waiting);
        let mut scope = harness.scope("merge");
        scope.merge_timeout = Some(Duration::from_millis(20));
        let err = ThreadMergeNode.process(scope).await.unwrap_err();
        assert!(matches!(err, StrandError::MergeTimeout { ref node_id, .. } if node_id == "merge"));
    }
}
