use futures::future::BoxFuture;
use serde_json::{json, Map, Value};
use tracing::debug;

use strand_core::error::{Result, StrandError};
use strand_core::types::{LogEvent, LogLevel};

use crate::context::STATE_KEY;
use crate::expr::{run_statement, to_text, validate_statement};
use crate::graph::{Node, NodeKind};
use crate::registry::{NodeBehavior, NodeMetadata, OutputField, ProcessScope};

/// Evaluates `value` and stores the result at `state.<variable>`.
pub struct SetStateNode;

impl NodeBehavior for SetStateNode {
    fn kind(&self) -> NodeKind {
        NodeKind::SetState
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            kind: NodeKind::SetState,
            name: "Set State",
            description: "Evaluates a statement and stores the result in the shared state",
        }
    }

    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>> {
        Box::pin(async move {
            let node = scope.node;
            let mut output = Map::new();
            output.insert("name".into(), Value::String(node.display_name().to_string()));

            let (Some(variable), Some(statement)) =
                (node.str_field("variable"), node.str_field("value"))
            else {
                debug!(node_id = %node.id, "Variable or value missing, nothing to set");
                scope.context.set_output(&node.id, Value::Object(output));
                return Ok(scope.all_outgoing());
            };
            if !validate_statement(statement) {
                return Err(StrandError::node(&node.id, "Value statement is invalid"));
            }

            let value = scope.context.write(|ctx| {
                let value = run_statement(statement, &*ctx);
                ctx.set_path(&format!("{STATE_KEY}.{variable}"), value.clone());
                value
            });
            output.insert(variable.to_string(), value.clone());
            scope.context.set_output(&node.id, Value::Object(output));

            scope.controller.log(
                LogEvent::new(
                    &node.id,
                    node.kind.as_str(),
                    LogLevel::Success,
                    "State value has been updated",
                )
                .with_payload(json!(format!("{variable} = {}", to_text(&value)))),
            );
            Ok(scope.all_outgoing())
        })
    }

    /// Only the variable: these placeholders resolve under `state`, not the
    /// node id.
    fn outputs(&self, node: &Node) -> Vec<OutputField> {
        node.str_field("variable")
            .map(|variable| OutputField::new(variable, variable, "Value stored in the state"))
            .into_iter()
            .collect()
    }

    fn value_identifier(&self, _node: &Node) -> Option<String> {
        Some(STATE_KEY.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, FlowDocument};
    use crate::nodes::testing::Harness;

    fn harness(node: Node) -> Harness {
        Harness::new(FlowDocument {
            nodes: vec![node, Node::new("next", NodeKind::ConsoleLog)],
            edges: vec![Edge::new("s", "next")],
        })
    }

    #[tokio::test]
    async fn test_sets_state_value() {
        let harness = harness(
            Node::new("s", NodeKind::SetState)
                .with_field("variable", "total")
                .with_field("value", "{p.count} * 2"),
        );
        harness.context.write(|ctx| ctx.set("p", json!({"count": 21})));

        let next = SetStateNode.process(harness.scope("s")).await.unwrap();
        assert_eq!(Harness::ids(&next), vec!["next"]);
        harness.context.read(|ctx| {
            assert_eq!(ctx.get_path("state.total").unwrap(), 42);
            assert_eq!(ctx.get_path("s.total").unwrap(), 42);
        });

        let logs = harness.logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].level, LogLevel::Success);
        assert_eq!(logs[0].payload, Some(json!("total = 42")));
    }

    #[tokio::test]
    async fn test_reads_previous_state() {
        let harness = harness(
            Node::new("s", NodeKind::SetState)
                .with_field("variable", "n")
                .with_field("value", "{state.n} + 1"),
        );
        harness.context.write(|ctx| ctx.set("state", json!({"n": 1})));
        SetStateNode.process(harness.scope("s")).await.unwrap();
        harness
            .context
            .read(|ctx| assert_eq!(ctx.get_path("state.n").unwrap(), 2));
    }

    #[tokio::test]
    async fn test_missing_fields_skip() {
        let harness = harness(Node::new("s", NodeKind::SetState).with_field("variable", "n"));
        let next = SetStateNode.process(harness.scope("s")).await.unwrap();
        assert_eq!(Harness::ids(&next), vec!["next"]);
        assert!(harness.logs().is_empty());
        harness
            .context
            .read(|ctx| assert!(ctx.get_path("state.n").is_none()));
    }

    #[tokio::test]
    async fn test_invalid_statement_fails() {
        let harness = harness(
            Node::new("s", NodeKind::SetState)
                .with_field("variable", "n")
                .with_field("value", "{a} ==="),
        );
        let err = SetStateNode.process(harness.scope("s")).await.unwrap_err();
        assert!(err.to_string().contains("Value statement is invalid"));
    }

    #[test]
    fn test_outputs_include_variable() {
        let node = Node::new("s", NodeKind::SetState).with_field("variable", "total");
        let names: Vec<String> = SetStateNode.outputs(&node).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["total"]);
        assert!(SetStateNode
            .outputs(&Node::new("s", NodeKind::SetState))
            .is_empty());
    }
}
