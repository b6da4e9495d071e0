use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::debug;

use strand_core::error::Result;

use super::name_field;
use crate::expr::{is_truthy, run_statement};
use crate::graph::{DecisionMeta, Edge, Node, NodeKind};
use crate::registry::{Branch, NodeBehavior, NodeMetadata, OutputField, ProcessScope};

/// Routes into exactly one outgoing branch.
///
/// Conditions are tried in edge order and the first truthy one wins; the
/// first `else` edge is the fallback. With neither, the branch ends here.
pub struct DecisionNode;

impl DecisionNode {
    fn select<'a>(scope: &ProcessScope<'a>) -> Option<Branch<'a>> {
        let conditional = scope.outgoing.iter().find(|branch| {
            let Some(meta) = branch.edge.data.as_ref() else {
                return false;
            };
            if meta.is_else() || meta.condition.trim().is_empty() {
                return false;
            }
            let value = scope
                .context
                .read(|ctx| run_statement(&meta.condition, ctx));
            is_truthy(&value)
        });
        conditional
            .or_else(|| {
                scope
                    .outgoing
                    .iter()
                    .find(|branch| branch.edge.data.as_ref().is_some_and(DecisionMeta::is_else))
            })
            .copied()
    }
}

impl NodeBehavior for DecisionNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Decision
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            kind: NodeKind::Decision,
            name: "Decision",
            description: "A decision point in the flow. Only one condition takes effect, \
                          even if several are true",
        }
    }

    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>> {
        Box::pin(async move {
            let selected = Self::select(&scope);
            let (label, target) = match selected {
                Some(branch) => (
                    branch
                        .edge
                        .data
                        .as_ref()
                        .map_or(Value::Null, |meta| Value::String(meta.name.clone())),
                    Value::String(branch.node.id.clone()),
                ),
                None => (Value::Null, Value::Null),
            };
            debug!(node_id = %scope.node.id, selected = %target, "Decision evaluated");
            scope.context.set_output(
                &scope.node.id,
                json!({
                    "name": scope.node.display_name(),
                    "selected": label,
                    "target": target,
                }),
            );
            Ok(selected.map(|branch| branch.node).into_iter().collect())
        })
    }

    fn outputs(&self, _node: &Node) -> Vec<OutputField> {
        vec![
            name_field(),
            OutputField::new("selected", "Selected condition", "Name of the branch taken"),
            OutputField::new("target", "Target node", "Id of the node the flow continued into"),
        ]
    }

    fn on_connect(&self, edge: &mut Edge) {
        if edge.data.is_none() {
            edge.data = Some(DecisionMeta::pending());
        }
    }

    fn on_disconnect(&self, edge: &mut Edge) {
        edge.data = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FlowDocument;
    use crate::nodes::testing::Harness;

    fn harness(edges: Vec<Edge>) -> Harness {
        Harness::new(FlowDocument {
            nodes: vec![
                Node::new("d", NodeKind::Decision),
                Node::new("big", NodeKind::ConsoleLog),
                Node::new("huge", NodeKind::ConsoleLog),
                Node::new("small", NodeKind::ConsoleLog),
            ],
            edges,
        })
    }

    fn routed(x: i64, edges: Vec<Edge>) -> Vec<String> {
        let harness = harness(edges);
        harness.context.write(|ctx| ctx.set("x", json!(x)));
        let next = futures::executor::block_on(DecisionNode.process(harness.scope("d"))).unwrap();
        Harness::ids(&next)
    }

    fn edges() -> Vec<Edge> {
        vec![
            Edge::new("d", "big").with_decision(DecisionMeta::when("big", "{x} > 5")),
            Edge::new("d", "huge").with_decision(DecisionMeta::when("huge", "{x} > 50")),
            Edge::new("d", "small").with_decision(DecisionMeta::otherwise("else")),
        ]
    }

    #[test]
    fn test_first_true_condition_wins() {
        assert_eq!(routed(100, edges()), vec!["big"]);
        assert_eq!(routed(10, edges()), vec!["big"]);
    }

    #[test]
    fn test_else_fallback() {
        assert_eq!(routed(1, edges()), vec!["small"]);
    }

    #[test]
    fn test_no_match_and_no_else_ends_branch() {
        let edges = vec![Edge::new("d", "big").with_decision(DecisionMeta::when("big", "{x} > 5"))];
        assert!(routed(1, edges).is_empty());
    }

    #[test]
    fn test_invalid_and_empty_conditions_are_false() {
        let edges = vec![
            Edge::new("d", "big").with_decision(DecisionMeta::when("bad", "{x} >")),
            Edge::new("d", "huge").with_decision(DecisionMeta::pending()),
            Edge::new("d", "small").with_decision(DecisionMeta::when("ok", "{x} == 1")),
        ];
        assert_eq!(routed(1, edges), vec!["small"]);
    }

    #[tokio::test]
    async fn test_records_selection() {
        let harness = harness(edges());
        harness.context.write(|ctx| ctx.set("x", json!(1)));
        DecisionNode.process(harness.scope("d")).await.unwrap();
        harness.context.read(|ctx| {
            assert_eq!(ctx.get_path("d.selected").and_then(|v| v.as_str()), Some("else"));
            assert_eq!(ctx.get_path("d.target").and_then(|v| v.as_str()), Some("small"));
        });
    }
}
