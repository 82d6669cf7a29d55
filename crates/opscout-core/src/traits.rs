use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client — streaming chat completions.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Text-generation gateway — turns structured findings into prose.
pub trait TextGenerator: Send + Sync + 'static {
    /// Generate text for `role` (the calling node), following `instructions`
    /// (the persona / system prompt) over `input`.
    fn generate(
        &self,
        role: &str,
        instructions: &str,
        input: &str,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Knowledge query gateway — read-only access to the patent knowledge graph.
pub trait KnowledgeQuery: Send + Sync + 'static {
    /// Run a parameterized Cypher query and return all rows.
    fn query(&self, cypher: &str, params: serde_json::Value) -> BoxFuture<'_, Result<Vec<Record>>>;
}

/// Vector search gateway — semantic lookup of candidate patents.
pub trait VectorSearch: Send + Sync + 'static {
    /// Embed a query text.
    fn embed(&self, text: &str) -> BoxFuture<'_, Result<Vec<f32>>>;

    /// Return the `k` nearest candidates, best first.
    fn search(&self, vector: Vec<f32>, k: usize) -> BoxFuture<'_, Result<Vec<Candidate>>>;
}
