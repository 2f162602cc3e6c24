//! Conversation core: messages, streaming, and turn orchestration.
//!
//! The [`ConversationController`] owns a [`MessageStore`] and talks to a
//! [`ModelService`]; everything else here is a building block it composes.

mod accumulator;
mod attachment;
mod citations;
mod controller;
pub mod render;
mod selector;
mod service;
mod store;
mod types;


pub use accumulator::StreamAccumulator;
pub use attachment::{mime_type_for, Attachment, MAX_ATTACHMENT_SIZE, SUPPORTED_DOCUMENTS};
pub use citations::dedupe;
pub use controller::{
    ControllerEvent, ControllerHandle, ConversationController, TurnOutcome, TurnState, UserAction,
};
pub use selector::{
    select_call_shape, CallShape, Composer, RejectReason, TurnInFlight, TurnInput, TurnRequest,
};
pub use service::{ChunkStream, ModelService, ResponseChunk};
pub use store::{rehydrate, MessageStore};
pub use types::{Author, Citation, Feedback, Message};
