use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::info;

use strand_core::error::Result;
use strand_core::types::{LogEvent, LogLevel};

use super::name_field;
use crate::expr::{is_truthy, run_statement, to_text};
use crate::graph::{Node, NodeKind};
use crate::registry::{NodeBehavior, NodeMetadata, OutputField, ProcessScope};

/// Evaluates the `log` statement and reports its value.
pub struct ConsoleLogNode;

impl NodeBehavior for ConsoleLogNode {
    fn kind(&self) -> NodeKind {
        NodeKind::ConsoleLog
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            kind: NodeKind::ConsoleLog,
            name: "Console Log",
            description: "Evaluates a statement and writes the result to the run log",
        }
    }

    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>> {
        Box::pin(async move {
            let node = scope.node;
            let value = match node.str_field("log") {
                Some(statement) => scope.context.read(|ctx| run_statement(statement, ctx)),
                None => Value::Null,
            };
            if is_truthy(&value) {
                info!(node_id = %node.id, value = %to_text(&value), "Console log");
                scope.controller.log(
                    LogEvent::new(&node.id, node.kind.as_str(), LogLevel::Success, "Log written")
                        .with_payload(value.clone()),
                );
            }
            scope.context.set_output(
                &node.id,
                json!({
                    "name": node.display_name(),
                    "log": value,
                }),
            );
            Ok(scope.all_outgoing())
        })
    }

    fn outputs(&self, _node: &Node) -> Vec<OutputField> {
        vec![
            name_field(),
            OutputField::new("log", "Log", "Value of the log statement"),
        ]
    }
}
