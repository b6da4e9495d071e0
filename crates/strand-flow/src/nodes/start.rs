use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::json;

use strand_core::error::Result;

use super::name_field;
use crate::graph::{Node, NodeKind};
use crate::registry::{NodeBehavior, NodeMetadata, OutputField, ProcessScope};

/// Entry point of a flow.
pub struct StartNode;

impl NodeBehavior for StartNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Start
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            kind: NodeKind::Start,
            name: "Start",
            description: "Entry point of the flow",
        }
    }

    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>> {
        Box::pin(async move {
            scope.context.set_output(
                &scope.node.id,
                json!({
                    "name": scope.node.display_name(),
                    "started_at": Utc::now().to_rfc3339(),
                }),
            );
            Ok(scope.all_outgoing())
        })
    }

    fn outputs(&self, _node: &Node) -> Vec<OutputField> {
        vec![
            name_field(),
            OutputField::new("started_at", "Started at", "Time the run started (RFC 3339)"),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, FlowDocument};
    use crate::nodes::testing::Harness;

    #[tokio::test]
    async fn test_start_records_output() {
        let harness = Harness::new(FlowDocument {
            nodes: vec![
                Node::new("start", NodeKind::Start),
                Node::new("log", NodeKind::ConsoleLog),
            ],
            edges: vec![Edge::new("start", "log")],
        });
        let next = StartNode.process(harness.scope("start")).await.unwrap();
        assert_eq!(Harness::ids(&next), vec!["log"]);
        harness.context.read(|ctx| {
            assert_eq!(ctx.get_path("start.name").and_then(|v| v.as_str()), Some("start"));
            assert!(ctx.get_path("start.started_at").is_some());
        });
    }
}
