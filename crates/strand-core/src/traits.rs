use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Chat-completion service used by prompt nodes.
pub trait ChatClient: Send + Sync + 'static {
    /// Send a chat request and wait for the full completion.
    fn chat(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatCompletion>>;
}

/// Side-effect sink handed to node processors.
///
/// Calls are fire-and-forget: the engine never depends on their outcome.
pub trait Controller: Send + Sync {
    fn log(&self, event: LogEvent);

    fn increase_in_token(&self, tokens: u64);

    fn increase_out_token(&self, tokens: u64);

    fn increase_amount(&self, cost: f64);
}
