use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Value};
use tracing::{debug, info};

use strand_core::config::ModelConfig;
use strand_core::error::{Result, StrandError};
use strand_core::pricing::PriceTable;
use strand_core::traits::{ChatClient, Controller};
use strand_core::types::{
    ChatMessage, ChatRequest, LogEvent, LogLevel, ResponseFormat, ResponseFormatKind,
};

use super::name_field;
use crate::context::ExecutionContext;
use crate::expr::interpolate;
use crate::graph::{Node, NodeKind};
use crate::registry::{NodeBehavior, NodeMetadata, OutputField, ProcessScope};

/// Sends a chat-completion request built from the node's messages.
///
/// Node fields:
/// - `model`: overrides the configured model id
/// - `system`, `prompt`: shorthand for a system and a user message
/// - `messages`: `[{role, content}]`, appended after the shorthand ones
/// - `temperature`, `top_p`, `max_tokens`
/// - `response_format`: `text`, `json_object` or `json_schema`, with
///   `json_schema` holding the schema for the latter
///
/// Message content is interpolated against the execution context.
pub struct PromptNode {
    client: Arc<dyn ChatClient>,
    model: ModelConfig,
    prices: PriceTable,
}

impl PromptNode {
    pub fn new(client: Arc<dyn ChatClient>, model: ModelConfig, prices: PriceTable) -> Self {
        Self {
            client,
            model,
            prices,
        }
    }

    fn build_messages(node: &Node, ctx: &ExecutionContext) -> Result<Vec<ChatMessage>> {
        let mut messages = Vec::new();
        if let Some(system) = node.str_field("system") {
            messages.push(ChatMessage::system(interpolate(system, ctx)));
        }
        if let Some(prompt) = node.str_field("prompt") {
            messages.push(ChatMessage::user(interpolate(prompt, ctx)));
        }
        if let Some(list) = node.field("messages") {
            let list: Vec<ChatMessage> = serde_json::from_value(list.clone())
                .map_err(|e| StrandError::node(&node.id, format!("Invalid messages: {e}")))?;
            messages.extend(list.into_iter().map(|m| ChatMessage {
                role: m.role,
                content: m.content.map(|c| interpolate(&c, ctx)),
            }));
        }
        if messages.is_empty() {
            return Err(StrandError::node(&node.id, "Prompt has no messages"));
        }
        Ok(messages)
    }

    fn build_request(&self, node: &Node, messages: Vec<ChatMessage>) -> Result<ChatRequest> {
        let model = node.str_field("model").unwrap_or(self.model.model_id.as_str());
        let mut request = ChatRequest::new(model, messages);
        request.temperature = node
            .field("temperature")
            .and_then(Value::as_f64)
            .map(|t| t as f32)
            .or(self.model.temperature);
        request.top_p = node.field("top_p").and_then(Value::as_f64).map(|p| p as f32);
        request.max_tokens = node
            .field("max_tokens")
            .and_then(Value::as_u64)
            .map(|n| n as u32)
            .or(self.model.max_tokens);
        request.response_format = match node.str_field("response_format") {
            None | Some("text") => None,
            Some("json_object") => Some(ResponseFormat {
                kind: ResponseFormatKind::JsonObject,
                json_schema: None,
            }),
            Some("json_schema") => Some(ResponseFormat {
                kind: ResponseFormatKind::JsonSchema,
                json_schema: node.field("json_schema").cloned(),
            }),
            Some(other) => {
                return Err(StrandError::node(
                    &node.id,
                    format!("Unknown response format '{other}'"),
                ))
            }
        };
        Ok(request)
    }
}

impl NodeBehavior for PromptNode {
    fn kind(&self) -> NodeKind {
        NodeKind::Prompt
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            kind: NodeKind::Prompt,
            name: "Prompt",
            description: "Sends a prompt to the language model and stores the reply",
        }
    }

    fn process<'a>(&'a self, scope: ProcessScope<'a>) -> BoxFuture<'a, Result<Vec<&'a Node>>> {
        Box::pin(async move {
            let node = scope.node;
            let messages = scope
                .context
                .read(|ctx| Self::build_messages(node, ctx))?;
            let request = self.build_request(node, messages)?;
            let wants_json = request.response_format.is_some();
            let model = request.model.clone();

            debug!(node_id = %node.id, model = %model, "Sending prompt");
            let completion = self.client.chat(request).await?;
            let usage = completion.usage;
            account(
                scope.controller,
                &self.prices,
                &model,
                usage.prompt_tokens,
                usage.completion_tokens,
            );

            let content = completion.content().unwrap_or_default().to_string();
            let mut output = json!({
                "name": node.display_name(),
                "content": content,
                "usage": usage,
                "model": model,
            });
            if wants_json {
                let parsed: Value = serde_json::from_str(&content).map_err(|e| {
                    StrandError::node(&node.id, format!("Reply is not valid JSON: {e}"))
                })?;
                output["json"] = parsed;
            }
            scope.context.set_output(&node.id, output);

            info!(
                node_id = %node.id,
                tokens = usage.total_tokens,
                "Prompt completed"
            );
            scope.controller.log(
                LogEvent::new(
                    &node.id,
                    node.kind.as_str(),
                    LogLevel::Success,
                    "Prompt completed",
                )
                .with_payload(json!({ "model": model, "usage": usage })),
            );
            Ok(scope.all_outgoing())
        })
    }

    fn outputs(&self, node: &Node) -> Vec<OutputField> {
        let mut fields = vec![
            name_field(),
            OutputField::new("content", "Content", "Text of the model reply"),
        ];
        if node
            .str_field("response_format")
            .is_some_and(|f| f != "text")
        {
            fields.push(OutputField::new("json", "JSON", "Reply parsed as JSON"));
        }
        fields.push(OutputField::new("usage", "Usage", "Token usage of the request"));
        fields
    }
}

fn account(
    controller: &dyn Controller,
    prices: &PriceTable,
    model: &str,
    input: u64,
    output: u64,
) {
    controller.increase_in_token(input);
    controller.increase_out_token(output);
    controller.increase_amount(prices.token_cost(input + output, model));
}
