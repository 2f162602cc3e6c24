//! # Inclusion Coach
//!
//! A streaming chat client for an inclusion and allyship coach backed by
//! Gemini. Replies stream into the conversation chunk by chunk, carry
//! deduplicated web citations, and survive restarts through a per-user
//! conversation snapshot.
//!
//! ## Features
//!
//! - **Streaming replies**: chunks are folded into the reply as they arrive
//! - **Single-flight turns**: a new submit is rejected while a reply streams
//! - **Deep analysis**: single-shot calls on a reasoning model, optionally over an attached document
//! - **Citations**: grounding sources deduplicated by URI, last title wins
//! - **Feedback**: thumbs up/down per reply, toggled and persisted
//!
//! ## Architecture
//!
//! ```text
//! CLI → ControllerHandle ─mpsc→ ConversationController → Gemini (SSE)
//!              ↑                         ↓
//!         broadcast events       MessageStore → SQLite (snapshots)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inclusion_coach::{Config, ConversationController, SessionContext, UserAction};
//! use inclusion_coach::gemini::GeminiClient;
//! use inclusion_coach::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = Arc::new(SqliteStorage::new(&config.database).await?);
//!     let gemini = Arc::new(GeminiClient::new(&config.gemini, config.request.clone())?);
//!     let session = SessionContext::login(storage, "alice").await?;
//!     let (handle, task) = ConversationController::new(session, gemini).spawn();
//!     handle.send(UserAction::Submit("How can I be a better ally?".into())).await?;
//!     drop(handle);
//!     task.await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Conversation model, streaming, and turn orchestration.
pub mod chat;
/// Terminal front-end helpers.
pub mod cli;
/// Configuration management.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Gemini streaming client.
pub mod gemini;
/// Persona prompt and fixed copy.
pub mod prompts;
/// Session identity and login lifecycle.
pub mod session;
/// SQLite storage layer for persistence.
pub mod storage;

pub use chat::{ConversationController, ControllerHandle, UserAction};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use session::SessionContext;
