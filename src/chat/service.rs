use async_trait::async_trait;
use futures::stream::BoxStream;

use super::attachment::Attachment;
use super::types::{Citation, Message};
use crate::error::ModelResult;

/// One unit of a streamed reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseChunk {
    /// Text to append to the reply.
    pub text_delta: String,
    /// Citations carried by this chunk, possibly repeating earlier ones.
    pub sources: Vec<Citation>,
}

impl ResponseChunk {
    /// A chunk carrying only text
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            text_delta: delta.into(),
            sources: Vec::new(),
        }
    }

    /// Add citations
    pub fn with_sources(mut self, sources: Vec<Citation>) -> Self {
        self.sources = sources;
        self
    }

    /// Whether the chunk carries nothing to apply
    pub fn is_empty(&self) -> bool {
        self.text_delta.is_empty() && self.sources.is_empty()
    }
}

/// Lazy, finite, non-restartable sequence of reply chunks.
pub type ChunkStream = BoxStream<'static, ModelResult<ResponseChunk>>;

/// The model-serving collaborator.
///
/// Both calls may fail before returning a stream or through an `Err` item
/// at any point while it is consumed.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Multi-turn chat: prior history plus the new user text
    async fn stream_chat(&self, history: &[Message], text: &str) -> ModelResult<ChunkStream>;

    /// Single-shot analysis of a topic or attached document, no history
    async fn stream_deep_dive(
        &self,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> ModelResult<ChunkStream>;
}
