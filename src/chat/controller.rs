//! Conversation controller.
//!
//! Drives one logical turn at a time:
//!
//! ```text
//! Idle → AwaitingFirstChunk → Streaming → Committed → Idle
//!                    └───────────┴──→ Failed ──┘
//! ```
//!
//! The controller can be driven directly (`submit`) or run as an actor fed
//! by [`UserAction`]s over a channel (`spawn`). In actor mode, actions that
//! arrive while a turn is in flight, opening included, are handled before the
//! next chunk: submits are rejected by the single-flight guard, everything
//! else applies at once.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::accumulator::StreamAccumulator;
use super::attachment::Attachment;
use super::selector::{CallShape, Composer, RejectReason, TurnInFlight, TurnInput, TurnRequest};
use super::service::{ChunkStream, ModelService, ResponseChunk};
use super::store::MessageStore;
use super::types::{Citation, Feedback, Message};
use crate::error::{AppError, AppResult, ModelResult};
use crate::prompts::CONNECTION_APOLOGY;
use crate::session::SessionContext;

const ACTION_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 256;

/// Lifecycle of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    /// No turn in flight.
    Idle,
    /// Request dispatched, nothing received yet.
    AwaitingFirstChunk,
    /// At least one chunk applied.
    Streaming,
    /// The collaborator failed; the apology is being written.
    Failed,
    /// Cleanup in progress.
    Committed,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::AwaitingFirstChunk => write!(f, "awaiting_first_chunk"),
            TurnState::Streaming => write!(f, "streaming"),
            TurnState::Failed => write!(f, "failed"),
            TurnState::Committed => write!(f, "committed"),
        }
    }
}

/// How a submit action ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The stream was exhausted normally.
    Completed,
    /// The collaborator failed; the apology replaced the reply.
    Failed,
    /// History was cleared or the user logged out mid-stream.
    Abandoned,
    /// The turn never started.
    Rejected(RejectReason),
}

/// Actions produced by the user-facing layer.
#[derive(Debug)]
pub enum UserAction {
    /// Send typed text (may be empty with a document attached).
    Submit(String),
    /// Summarize the attached document.
    Summarize,
    /// Send one of the conversation starters.
    SelectStarter(usize),
    /// Start a guided scenario.
    StartScenario(usize),
    /// Flip the deep-analysis toggle.
    ToggleDeepDive,
    /// Set the deep-analysis toggle.
    SetDeepDive(bool),
    /// Attach a document; forces deep analysis for the next turn.
    Attach(Attachment),
    /// Drop the attached document.
    RemoveAttachment,
    /// Rate a message; repeating the same rating clears it.
    Feedback {
        /// Message being rated
        message_id: String,
        /// Requested rating
        value: Feedback,
    },
    /// Reset the conversation to the greeting.
    ClearHistory,
    /// End the session and forget its history.
    Logout,
    /// Ask for a copy of the conversation.
    History(oneshot::Sender<Vec<Message>>),
}

impl UserAction {
    fn into_turn_input(self) -> Result<TurnInput, UserAction> {
        match self {
            UserAction::Submit(text) => Ok(TurnInput::Text(text)),
            UserAction::Summarize => Ok(TurnInput::Summarize),
            UserAction::SelectStarter(index) => Ok(TurnInput::Starter(index)),
            UserAction::StartScenario(index) => Ok(TurnInput::Scenario(index)),
            other => Err(other),
        }
    }
}

/// Notifications for the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// User message and empty reply appended; waiting for the first chunk.
    TurnStarted {
        /// The appended user message
        user_message_id: String,
        /// The empty AI reply chunks will fill
        reply_id: String,
        /// Chat or deep dive
        shape: CallShape,
        /// Document under analysis, for the waiting label
        attachment_label: Option<String>,
    },
    /// A chunk was folded into the reply; `sources` is the running deduplicated list.
    ChunkApplied {
        /// The reply being streamed
        message_id: String,
        /// Text appended by this chunk
        delta: String,
        /// All sources so far
        sources: Vec<Citation>,
    },
    /// The reply was replaced with the apology.
    TurnFailed {
        /// The message now holding the apology
        message_id: Option<String>,
        /// What went wrong, for logs and diagnostics
        error: String,
    },
    /// Cleanup done; the controller is idle again.
    TurnFinished {
        /// How the turn ended
        outcome: TurnOutcome,
    },
    /// A submit was refused without touching the conversation.
    SubmitRejected {
        /// Why it was refused
        reason: RejectReason,
    },
    /// A message's rating changed.
    FeedbackChanged {
        /// The rated message
        message_id: String,
        /// Rating after the toggle
        feedback: Option<Feedback>,
    },
    /// The conversation is back to the greeting.
    HistoryCleared,
    /// The effective deep-analysis toggle changed.
    DeepDiveChanged {
        /// New effective state
        enabled: bool,
    },
    /// `None` once the document is removed or consumed by a turn.
    AttachmentChanged {
        /// Attached file, if any
        file_name: Option<String>,
    },
    /// The session ended; the actor stops after this.
    LoggedOut {
        /// Who logged out
        username: String,
    },
}

/// Whether an in-turn action lets the stream continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Abandon,
}

/// How the stream phase of a turn ended without error.
enum StreamEnd {
    Exhausted,
    Abandoned,
}

/// A turn that passed the guard and was appended to the store.
struct PendingTurn {
    request: TurnRequest,
    history: Vec<Message>,
}

/// Owns the session and orchestrates turns against the model.
pub struct ConversationController {
    session: SessionContext,
    model: Arc<dyn ModelService>,
    composer: Composer,
    state: TurnState,
    in_flight: Option<TurnInFlight>,
    events: broadcast::Sender<ControllerEvent>,
    ended: bool,
}

impl ConversationController {
    /// Create a controller for an open session
    pub fn new(session: SessionContext, model: Arc<dyn ModelService>) -> Self {
        let (events, _) = broadcast::channel(EVENT_QUEUE);
        Self {
            session,
            model,
            composer: Composer::default(),
            state: TurnState::Idle,
            in_flight: None,
            events,
            ended: false,
        }
    }

    /// Start with the deep-dive toggle set
    pub fn with_deep_dive(mut self, enabled: bool) -> Self {
        self.composer = Composer::new(enabled);
        self
    }

    /// Receive controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    /// The conversation
    pub fn messages(&self) -> &[Message] {
        self.session.store().messages()
    }

    /// The message store
    pub fn store(&self) -> &MessageStore {
        self.session.store()
    }

    /// The active session
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Current turn state
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// The turn being answered, if any
    pub fn in_flight(&self) -> Option<&TurnInFlight> {
        self.in_flight.as_ref()
    }

    /// Toggle and attachment held for the next turn
    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Whether the session was ended by logout
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Run one turn to completion
    pub async fn submit(&mut self, input: TurnInput) -> TurnOutcome {
        let pending = match self.begin_turn(input).await {
            Ok(pending) => pending,
            Err(reason) => return TurnOutcome::Rejected(reason),
        };
        let result = self.stream_turn(pending, None).await;
        self.finish_turn(result).await
    }

    /// Flip the deep-dive toggle
    pub fn toggle_deep_dive(&mut self) -> bool {
        let enabled = self.composer.toggle_deep_dive();
        self.emit(ControllerEvent::DeepDiveChanged { enabled });
        enabled
    }

    /// Set the deep-dive toggle
    pub fn set_deep_dive(&mut self, enabled: bool) -> bool {
        let enabled = self.composer.set_deep_dive(enabled);
        self.emit(ControllerEvent::DeepDiveChanged { enabled });
        enabled
    }

    /// Attach a document to the next turn
    pub fn attach(&mut self, attachment: Attachment) {
        let file_name = attachment.file_name.clone();
        self.composer.attach(attachment);
        info!(file = %file_name, "Document attached");
        self.emit(ControllerEvent::AttachmentChanged {
            file_name: Some(file_name),
        });
        self.emit(ControllerEvent::DeepDiveChanged {
            enabled: self.composer.deep_dive_enabled(),
        });
    }

    /// Remove the attached document
    pub fn remove_attachment(&mut self) {
        if self.composer.remove_attachment().is_some() {
            self.emit(ControllerEvent::AttachmentChanged { file_name: None });
            self.emit(ControllerEvent::DeepDiveChanged {
                enabled: self.composer.deep_dive_enabled(),
            });
        }
    }

    /// Rate a message; choosing the same rating twice clears it
    pub async fn give_feedback(&mut self, message_id: &str, value: Feedback) {
        match self
            .session
            .store_mut()
            .set_feedback(message_id, value)
            .await
        {
            Some(feedback) => {
                info!(message_id = %message_id, feedback = ?feedback, "Feedback recorded");
                self.emit(ControllerEvent::FeedbackChanged {
                    message_id: message_id.to_string(),
                    feedback,
                });
            }
            None => debug!(message_id = %message_id, "Feedback for unknown message ignored"),
        }
    }

    /// Reset the conversation to the greeting
    pub async fn clear_history(&mut self) {
        self.session.store_mut().clear().await;
        info!(user = %self.session.username(), "Chat history cleared");
        self.emit(ControllerEvent::HistoryCleared);
    }

    /// End the session: forget the user and their history
    pub async fn logout(&mut self) {
        if let Err(e) = self.session.end().await {
            warn!(error = %e, "Failed to clear session identity");
        }
        self.ended = true;
        info!(user = %self.session.username(), "Logged out");
        self.emit(ControllerEvent::LoggedOut {
            username: self.session.username().to_string(),
        });
    }

    /// Run as an actor until the action channel closes or the user logs out
    pub fn spawn(self) -> (ControllerHandle, JoinHandle<ConversationController>) {
        let (actions, receiver) = mpsc::channel(ACTION_QUEUE);
        let handle = ControllerHandle {
            actions,
            events: self.events.clone(),
        };
        (handle, tokio::spawn(self.run(receiver)))
    }

    /// Process actions until the channel closes or the session ends
    pub async fn run(mut self, mut actions: mpsc::Receiver<UserAction>) -> Self {
        while let Some(action) = actions.recv().await {
            match action.into_turn_input() {
                Ok(input) => {
                    if let Ok(pending) = self.begin_turn(input).await {
                        let result = self.stream_turn(pending, Some(&mut actions)).await;
                        self.finish_turn(result).await;
                    }
                }
                Err(action) => {
                    self.apply(action).await;
                }
            }

            if self.ended {
                break;
            }
        }
        debug!("Controller stopped");
        self
    }

    /// Non-turn actions; clear and logout abandon an in-flight turn
    async fn apply(&mut self, action: UserAction) -> Flow {
        match action {
            UserAction::ToggleDeepDive => {
                self.toggle_deep_dive();
            }
            UserAction::SetDeepDive(enabled) => {
                self.set_deep_dive(enabled);
            }
            UserAction::Attach(attachment) => self.attach(attachment),
            UserAction::RemoveAttachment => self.remove_attachment(),
            UserAction::Feedback { message_id, value } => {
                self.give_feedback(&message_id, value).await
            }
            UserAction::ClearHistory => {
                self.clear_history().await;
                return Flow::Abandon;
            }
            UserAction::Logout => {
                self.logout().await;
                return Flow::Abandon;
            }
            UserAction::History(reply) => {
                let _ = reply.send(self.messages().to_vec());
            }
            UserAction::Submit(_)
            | UserAction::Summarize
            | UserAction::SelectStarter(_)
            | UserAction::StartScenario(_) => {
                unreachable!("turn actions are routed through begin_turn")
            }
        }
        Flow::Continue
    }

    /// Guard, compose, and append the user message with an empty reply
    async fn begin_turn(&mut self, input: TurnInput) -> Result<PendingTurn, RejectReason> {
        if self.state != TurnState::Idle {
            debug!(state = %self.state, "Submit rejected: turn in flight");
            return Err(self.reject(RejectReason::TurnInFlight));
        }

        let request = match self.composer.compose(input) {
            Ok(request) => request,
            Err(reason) => return Err(self.reject(reason)),
        };
        let history = match request.shape {
            CallShape::Chat => self.messages().to_vec(),
            CallShape::DeepDive => Vec::new(),
        };

        let user_message = Message::user(&request.text);
        let reply = Message::placeholder();
        let user_message_id = user_message.id.clone();
        let reply_id = reply.id.clone();
        self.session
            .store_mut()
            .append([user_message, reply])
            .await;

        let attachment_label = request.attachment.as_ref().map(|a| a.file_name.clone());
        self.in_flight = Some(TurnInFlight {
            shape: request.shape,
            attachment_label: attachment_label.clone(),
        });
        self.transition(TurnState::AwaitingFirstChunk);

        info!(
            shape = %request.shape,
            attachment = ?attachment_label,
            history = history.len(),
            "Turn started"
        );
        if attachment_label.is_some() {
            self.emit(ControllerEvent::AttachmentChanged { file_name: None });
        }
        self.emit(ControllerEvent::TurnStarted {
            user_message_id,
            reply_id,
            shape: request.shape,
            attachment_label,
        });

        Ok(PendingTurn { request, history })
    }

    /// Dispatch the request and fold the reply into the store
    async fn stream_turn(
        &mut self,
        pending: PendingTurn,
        mut actions: Option<&mut mpsc::Receiver<UserAction>>,
    ) -> ModelResult<StreamEnd> {
        // Actions are served while the stream opens, retries and backoff included.
        let model = Arc::clone(&self.model);
        let open = open_stream(model.as_ref(), &pending);
        tokio::pin!(open);
        let mut stream = loop {
            tokio::select! {
                biased;
                opened = &mut open => {
                    if self.drain_actions(&mut actions).await == Flow::Abandon {
                        return Ok(StreamEnd::Abandoned);
                    }
                    break opened?;
                }
                Some(action) = next_action(&mut actions) => {
                    if self.apply_mid_turn(action).await == Flow::Abandon {
                        info!("Turn abandoned before the stream opened");
                        return Ok(StreamEnd::Abandoned);
                    }
                }
            }
        };
        let mut accumulator = StreamAccumulator::new();

        loop {
            // a stream that is always ready would otherwise starve the action branch
            if self.drain_actions(&mut actions).await == Flow::Abandon {
                info!(chunks = accumulator.chunk_count(), "Turn abandoned");
                return Ok(StreamEnd::Abandoned);
            }

            tokio::select! {
                biased;
                item = stream.next() => match item {
                    Some(chunk) => self.apply_chunk(&mut accumulator, chunk?),
                    None => {
                        debug!(chunks = accumulator.chunk_count(), "Stream exhausted");
                        return Ok(StreamEnd::Exhausted);
                    }
                },
                Some(action) = next_action(&mut actions) => {
                    if self.apply_mid_turn(action).await == Flow::Abandon {
                        info!(chunks = accumulator.chunk_count(), "Turn abandoned");
                        return Ok(StreamEnd::Abandoned);
                    }
                }
            }
        }
    }

    /// Apply every action already queued, without waiting for more
    async fn drain_actions(
        &mut self,
        actions: &mut Option<&mut mpsc::Receiver<UserAction>>,
    ) -> Flow {
        let Some(receiver) = actions.as_deref_mut() else {
            return Flow::Continue;
        };
        while let Ok(action) = receiver.try_recv() {
            if self.apply_mid_turn(action).await == Flow::Abandon {
                return Flow::Abandon;
            }
        }
        Flow::Continue
    }

    async fn apply_mid_turn(&mut self, action: UserAction) -> Flow {
        match action.into_turn_input() {
            Ok(input) => {
                // single-flight guard rejects it
                let _ = self.begin_turn(input).await;
                Flow::Continue
            }
            Err(action) => self.apply(action).await,
        }
    }

    fn apply_chunk(&mut self, accumulator: &mut StreamAccumulator, chunk: ResponseChunk) {
        if self.state == TurnState::AwaitingFirstChunk {
            self.transition(TurnState::Streaming);
        }

        let store = self.session.store_mut();
        if !accumulator.push_and_apply(&chunk, store) {
            warn!("Trailing message is not an AI reply; chunk dropped");
            return;
        }

        let message_id = store.last().map(|m| m.id.clone()).unwrap_or_default();
        self.emit(ControllerEvent::ChunkApplied {
            message_id,
            delta: chunk.text_delta,
            sources: accumulator.sources().to_vec(),
        });
    }

    /// Failure overwrite, then unconditional cleanup back to `Idle`
    async fn finish_turn(&mut self, result: ModelResult<StreamEnd>) -> TurnOutcome {
        let outcome = match result {
            Ok(StreamEnd::Exhausted) => TurnOutcome::Completed,
            Ok(StreamEnd::Abandoned) => TurnOutcome::Abandoned,
            Err(e) => {
                self.transition(TurnState::Failed);
                error!(error = %e, "Failed to get response");

                let store = self.session.store_mut();
                store.replace_last(Message::error(CONNECTION_APOLOGY)).await;
                let message_id = store.last().map(|m| m.id.clone());
                self.emit(ControllerEvent::TurnFailed {
                    message_id,
                    error: e.to_string(),
                });
                TurnOutcome::Failed
            }
        };

        self.transition(TurnState::Committed);
        self.session.store().persist().await;
        self.in_flight = None;
        self.composer.turn_completed();
        self.transition(TurnState::Idle);

        info!(outcome = ?outcome, messages = self.messages().len(), "Turn finished");
        self.emit(ControllerEvent::TurnFinished { outcome });
        outcome
    }

    fn reject(&self, reason: RejectReason) -> RejectReason {
        self.emit(ControllerEvent::SubmitRejected { reason });
        reason
    }

    fn transition(&mut self, next: TurnState) {
        debug!(from = %self.state, to = %next, "Turn state");
        self.state = next;
    }

    fn emit(&self, event: ControllerEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

async fn open_stream(model: &dyn ModelService, pending: &PendingTurn) -> ModelResult<ChunkStream> {
    let request = &pending.request;
    match request.shape {
        CallShape::Chat => model.stream_chat(&pending.history, &request.text).await,
        CallShape::DeepDive => {
            model
                .stream_deep_dive(&request.text, request.attachment.as_ref())
                .await
        }
    }
}

async fn next_action(
    actions: &mut Option<&mut mpsc::Receiver<UserAction>>,
) -> Option<UserAction> {
    match actions {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable front door to a spawned controller.
#[derive(Clone)]
pub struct ControllerHandle {
    actions: mpsc::Sender<UserAction>,
    events: broadcast::Sender<ControllerEvent>,
}

impl ControllerHandle {
    /// Queue an action
    pub async fn send(&self, action: UserAction) -> AppResult<()> {
        self.actions
            .send(action)
            .await
            .map_err(|_| AppError::Internal {
                message: "conversation controller has stopped".to_string(),
            })
    }

    /// Copy of the conversation as the controller currently holds it
    pub async fn history(&self) -> AppResult<Vec<Message>> {
        let (reply, response) = oneshot::channel();
        self.send(UserAction::History(reply)).await?;
        response.await.map_err(|_| AppError::Internal {
            message: "conversation controller has stopped".to_string(),
        })
    }

    /// Receive controller events
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }
}
