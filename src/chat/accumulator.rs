//! Folds streamed chunks into the trailing AI reply.

use tracing::debug;

use super::citations::dedupe;
use super::service::ResponseChunk;
use super::store::MessageStore;
use super::types::Citation;

/// Folds streamed chunks into one growing reply.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    sources: Vec<Citation>,
    chunks: usize,
}

impl StreamAccumulator {
    /// Start an empty reply
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk: append its text and merge its sources
    pub fn push(&mut self, chunk: &ResponseChunk) {
        self.text.push_str(&chunk.text_delta);
        if !chunk.sources.is_empty() {
            self.sources.extend(chunk.sources.iter().cloned());
            self.sources = dedupe(&self.sources);
        }
        self.chunks += 1;
    }

    /// Write the running reply into the trailing AI message
    pub fn apply(&self, store: &mut MessageStore) -> bool {
        store.update_last(|last| {
            last.content.clone_from(&self.text);
            last.sources.clone_from(&self.sources);
        })
    }

    /// Fold `chunk` and write the result into the store
    pub fn push_and_apply(&mut self, chunk: &ResponseChunk, store: &mut MessageStore) -> bool {
        self.push(chunk);
        let applied = self.apply(store);
        debug!(
            chunk = self.chunks,
            delta_len = chunk.text_delta.len(),
            total_len = self.text.len(),
            sources = self.sources.len(),
            "Applied response chunk"
        );
        applied
    }

    /// Text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Deduplicated sources accumulated so far
    pub fn sources(&self) -> &[Citation] {
        &self.sources
    }

    /// Number of chunks folded
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }
}
