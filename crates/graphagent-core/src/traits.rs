use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Streaming chat completion client.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Ranked document snippets for a query.
///
/// Implementations return an empty list when nothing matches and a single
/// sentinel snippet (see [`Snippet::retrieval_error`]) when the backend is
/// unreachable. `Err` is reserved for failures the backend could not turn
/// into a sentinel itself.
pub trait Retriever: Send + Sync + 'static {
    /// Backend name (e.g., "http", "keyword").
    fn name(&self) -> &str;

    /// Search for up to `limit` snippets matching `query`.
    fn search(&self, query: &str, limit: usize) -> BoxFuture<'_, Result<Vec<Snippet>>>;
}
