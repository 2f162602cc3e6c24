//! Gemini implementation of the model-serving collaborator.
//!
//! Replies are requested from `streamGenerateContent?alt=sse` and decoded
//! frame by frame into [`ResponseChunk`](crate::chat::ResponseChunk)s.

mod client;
mod sse;
mod types;


pub use client::GeminiClient;
pub use sse::SseDecoder;
pub use types::{
    ApiErrorBody, Candidate, Content, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, GoogleSearch, GroundingChunk, GroundingMetadata, InlineData, Part,
    ThinkingConfig, Tool, WebSource,
};
