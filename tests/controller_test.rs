//! Integration tests for the conversation controller
//!
//! Drives turns against a scripted model and an in-memory SQLite store,
//! both directly and through the spawned actor.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, oneshot};

use inclusion_coach::chat::{
    Attachment, CallShape, ChunkStream, Citation, ControllerEvent, ConversationController,
    Feedback, Message, ModelService, RejectReason, ResponseChunk, TurnInput, TurnOutcome,
    TurnState, UserAction,
};
use inclusion_coach::error::{ModelError, ModelResult};
use inclusion_coach::prompts::{
    CONNECTION_APOLOGY, CONVERSATION_STARTERS, SCENARIOS, SUMMARIZE_INSTRUCTION,
};
use inclusion_coach::session::SessionContext;
use inclusion_coach::storage::{history_key, SqliteStorage, Storage};

/// A call the controller made against the model
#[derive(Debug, Clone, PartialEq)]
enum Call {
    Chat {
        history: Vec<String>,
        text: String,
    },
    DeepDive {
        text: String,
        attachment: Option<String>,
    },
}

/// What the model does for one call
enum Script {
    Chunks(Vec<ModelResult<ResponseChunk>>),
    FailOpen,
    /// Emit `before`, wait for the gate, then emit `after`.
    Gated {
        before: Vec<ModelResult<ResponseChunk>>,
        gate: oneshot::Receiver<()>,
        after: Vec<ModelResult<ResponseChunk>>,
    },
    /// Take this long to open, then behave like the inner script.
    SlowOpen(Duration, Box<Script>),
}

struct ScriptedModel {
    calls: Mutex<Vec<Call>>,
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedModel {
    fn new(scripts: Vec<Script>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(scripts.into()),
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn play(&self, call: Call) -> ModelResult<ChunkStream> {
        self.calls.lock().unwrap().push(call);
        let mut next = self.scripts.lock().unwrap().pop_front();
        let script = loop {
            match next {
                Some(Script::SlowOpen(delay, inner)) => {
                    tokio::time::sleep(delay).await;
                    next = Some(*inner);
                }
                other => break other,
            }
        };

        match script {
            Some(Script::Chunks(items)) => Ok(Box::pin(futures::stream::iter(items))),
            Some(Script::Gated {
                before,
                gate,
                after,
            }) => Ok(Box::pin(async_stream::stream! {
                for item in before {
                    yield item;
                }
                let _ = gate.await;
                for item in after {
                    yield item;
                }
            })),
            Some(Script::SlowOpen(..)) => unreachable!("unwrapped above"),
            Some(Script::FailOpen) | None => Err(ModelError::Unavailable {
                message: "connection refused".to_string(),
                retries: 1,
            }),
        }
    }
}

#[async_trait]
impl ModelService for ScriptedModel {
    async fn stream_chat(&self, history: &[Message], text: &str) -> ModelResult<ChunkStream> {
        self.play(Call::Chat {
            history: history.iter().map(|m| m.content.clone()).collect(),
            text: text.to_string(),
        })
        .await
    }

    async fn stream_deep_dive(
        &self,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> ModelResult<ChunkStream> {
        self.play(Call::DeepDive {
            text: text.to_string(),
            attachment: attachment.map(|a| a.file_name.clone()),
        })
        .await
    }
}

fn chunk(text: &str) -> ModelResult<ResponseChunk> {
    Ok(ResponseChunk::text(text))
}

fn stream_failure() -> ModelResult<ResponseChunk> {
    Err(ModelError::Stream {
        message: "connection reset".to_string(),
    })
}

fn document(name: &str) -> Attachment {
    Attachment::new(name, "application/pdf", b"%PDF-1.7".to_vec())
}

async fn setup(
    scripts: Vec<Script>,
) -> (ConversationController, Arc<ScriptedModel>, Arc<dyn Storage>) {
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::new_in_memory()
            .await
            .expect("Failed to create in-memory storage"),
    );
    let session = SessionContext::login(storage.clone(), "tester")
        .await
        .expect("Failed to log in");
    let model = Arc::new(ScriptedModel::new(scripts));
    let controller = ConversationController::new(session, model.clone());
    (controller, model, storage)
}

async fn next_event(events: &mut broadcast::Receiver<ControllerEvent>) -> ControllerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for controller event")
        .expect("event channel closed")
}

async fn wait_for(
    events: &mut broadcast::Receiver<ControllerEvent>,
    matches: impl Fn(&ControllerEvent) -> bool,
) -> ControllerEvent {
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

#[cfg(test)]
mod turn_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_chunks_apply_in_arrival_order() {
        let (mut controller, _, _) = setup(vec![Script::Chunks(vec![
            chunk("Hel"),
            chunk("lo"),
            chunk(", "),
            chunk("world"),
        ])])
        .await;

        let outcome = controller.submit(TurnInput::Text("Hi".into())).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        let messages = controller.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].content, "Hi");
        assert!(!messages[1].is_ai());
        assert_eq!(messages[2].content, "Hello, world");
        assert!(messages[2].is_ai());
        assert_eq!(controller.state(), TurnState::Idle);
        assert!(controller.in_flight().is_none());
    }

    #[tokio::test]
    async fn test_sources_are_deduplicated_across_chunks() {
        let (mut controller, _, _) = setup(vec![Script::Chunks(vec![
            Ok(ResponseChunk::text("A ").with_sources(vec![
                Citation::new("https://a", "First"),
                Citation::new("https://b", "B"),
            ])),
            Ok(ResponseChunk::text("B").with_sources(vec![Citation::new("https://a", "Second")])),
        ])])
        .await;

        controller.submit(TurnInput::Text("Sources?".into())).await;

        assert_eq!(
            controller.messages()[2].sources,
            vec![
                Citation::new("https://a", "Second"),
                Citation::new("https://b", "B")
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_mid_stream_overwrites_partial_text() {
        let (mut controller, _, _) = setup(vec![Script::Chunks(vec![
            Ok(ResponseChunk::text("Hello").with_sources(vec![Citation::new("https://a", "A")])),
            chunk(" wor"),
            stream_failure(),
            chunk("never applied"),
        ])])
        .await;

        let outcome = controller.submit(TurnInput::Text("Hi".into())).await;

        assert_eq!(outcome, TurnOutcome::Failed);
        let messages = controller.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, CONNECTION_APOLOGY);
        assert!(messages[2].sources.is_empty());
        assert_eq!(controller.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn test_failure_before_first_chunk() {
        let (mut controller, _, _) = setup(vec![Script::FailOpen]).await;

        let outcome = controller.submit(TurnInput::Text("Hi".into())).await;

        assert_eq!(outcome, TurnOutcome::Failed);
        assert_eq!(controller.messages().len(), 3);
        assert_eq!(controller.messages()[2].content, CONNECTION_APOLOGY);
        assert!(controller.in_flight().is_none());
    }

    #[tokio::test]
    async fn test_immediate_stream_error() {
        let (mut controller, _, _) = setup(vec![Script::Chunks(vec![stream_failure()])]).await;

        assert_eq!(
            controller.submit(TurnInput::Text("Hi".into())).await,
            TurnOutcome::Failed
        );
        assert_eq!(controller.messages()[2].content, CONNECTION_APOLOGY);
    }

    #[tokio::test]
    async fn test_conversation_usable_after_failure() {
        let (mut controller, model, _) = setup(vec![
            Script::FailOpen,
            Script::Chunks(vec![chunk("Back again")]),
        ])
        .await;

        controller.submit(TurnInput::Text("First".into())).await;
        let outcome = controller.submit(TurnInput::Text("Second".into())).await;

        assert_eq!(outcome, TurnOutcome::Completed);
        assert_eq!(controller.messages().len(), 5);
        assert_eq!(controller.messages()[4].content, "Back again");

        // the apology is part of the history sent with the next turn
        match &model.calls()[1] {
            Call::Chat { history, text } => {
                assert_eq!(history.len(), 3);
                assert_eq!(history[2], CONNECTION_APOLOGY);
                assert_eq!(text, "Second");
            }
            other => panic!("Expected chat call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_submit_is_rejected() {
        let (mut controller, model, _) = setup(vec![]).await;

        let outcome = controller.submit(TurnInput::Text("   ".into())).await;

        assert_eq!(outcome, TurnOutcome::Rejected(RejectReason::Empty));
        assert_eq!(controller.messages().len(), 1);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_chat_sends_prior_history() {
        let (mut controller, model, _) = setup(vec![
            Script::Chunks(vec![chunk("One")]),
            Script::Chunks(vec![chunk("Two")]),
        ])
        .await;

        controller.submit(TurnInput::Text("First".into())).await;
        controller.submit(TurnInput::Text("Second".into())).await;

        let calls = model.calls();
        assert_eq!(calls.len(), 2);
        match (&calls[0], &calls[1]) {
            (
                Call::Chat {
                    history: first, ..
                },
                Call::Chat {
                    history: second,
                    text,
                },
            ) => {
                assert_eq!(first.len(), 1);
                assert_eq!(&second[1..], &["First".to_string(), "One".to_string()]);
                assert_eq!(text, "Second");
            }
            other => panic!("Expected two chat calls, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_events_for_a_turn() {
        let (mut controller, _, _) =
            setup(vec![Script::Chunks(vec![chunk("Hi"), chunk(" there")])]).await;
        let mut events = controller.subscribe();

        controller.submit(TurnInput::Text("Hello".into())).await;

        match next_event(&mut events).await {
            ControllerEvent::TurnStarted {
                shape,
                attachment_label,
                ..
            } => {
                assert_eq!(shape, CallShape::Chat);
                assert!(attachment_label.is_none());
            }
            other => panic!("Expected TurnStarted, got {:?}", other),
        }
        let deltas: Vec<String> = [next_event(&mut events).await, next_event(&mut events).await]
            .into_iter()
            .map(|e| match e {
                ControllerEvent::ChunkApplied { delta, .. } => delta,
                other => panic!("Expected ChunkApplied, got {:?}", other),
            })
            .collect();
        assert_eq!(deltas, vec!["Hi".to_string(), " there".to_string()]);
        assert_eq!(
            next_event(&mut events).await,
            ControllerEvent::TurnFinished {
                outcome: TurnOutcome::Completed
            }
        );
    }
}

#[cfg(test)]
mod mode_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_attachment_forces_deep_dive() {
        let (mut controller, model, _) =
            setup(vec![Script::Chunks(vec![chunk("It covers...")])]).await;
        assert!(!controller.composer().deep_dive_enabled());

        controller.attach(document("plan.pdf"));
        assert!(controller.composer().deep_dive_enabled());

        controller
            .submit(TurnInput::Text("What does it say?".into()))
            .await;

        assert_eq!(
            model.calls(),
            vec![Call::DeepDive {
                text: "What does it say?".to_string(),
                attachment: Some("plan.pdf".to_string()),
            }]
        );
        assert!(controller.composer().attachment().is_none());
        assert!(!controller.composer().deep_dive_enabled());
    }

    #[tokio::test]
    async fn test_empty_text_with_document_synthesizes_label() {
        let (mut controller, model, _) = setup(vec![Script::Chunks(vec![chunk("ok")])]).await;

        controller.attach(document("plan.pdf"));
        controller.submit(TurnInput::Text(String::new())).await;

        assert_eq!(
            controller.messages()[1].content,
            "Analyze the document: plan.pdf"
        );
        assert!(matches!(&model.calls()[0], Call::DeepDive { text, .. } if text == "Analyze the document: plan.pdf"));
    }

    #[tokio::test]
    async fn test_toggle_sends_deep_dive_without_history() {
        let (mut controller, model, _) = setup(vec![
            Script::Chunks(vec![chunk("chat")]),
            Script::Chunks(vec![chunk("deep")]),
        ])
        .await;

        controller.submit(TurnInput::Text("First".into())).await;
        assert!(controller.toggle_deep_dive());
        controller
            .submit(TurnInput::Text("Explain in depth".into()))
            .await;

        assert_eq!(
            model.calls()[1],
            Call::DeepDive {
                text: "Explain in depth".to_string(),
                attachment: None,
            }
        );
        // an explicit toggle survives the turn
        assert!(controller.composer().deep_dive_enabled());
    }

    #[tokio::test]
    async fn test_summarize_shortcut() {
        let (mut controller, model, _) = setup(vec![Script::Chunks(vec![chunk("Summary")])]).await;

        assert_eq!(
            controller.submit(TurnInput::Summarize).await,
            TurnOutcome::Rejected(RejectReason::NoAttachment)
        );

        controller.attach(document("policy.pdf"));
        controller.submit(TurnInput::Summarize).await;

        assert_eq!(
            model.calls(),
            vec![Call::DeepDive {
                text: SUMMARIZE_INSTRUCTION.to_string(),
                attachment: Some("policy.pdf".to_string()),
            }]
        );
        assert_eq!(controller.messages()[1].content, SUMMARIZE_INSTRUCTION);
    }

    #[tokio::test]
    async fn test_removing_attachment_restores_chat() {
        let (mut controller, model, _) = setup(vec![Script::Chunks(vec![chunk("ok")])]).await;

        controller.attach(document("plan.pdf"));
        controller.remove_attachment();
        controller.submit(TurnInput::Text("Hi".into())).await;

        assert!(matches!(model.calls()[0], Call::Chat { .. }));
    }

    #[tokio::test]
    async fn test_starter_submits_its_text() {
        let (mut controller, model, _) = setup(vec![Script::Chunks(vec![chunk("ok")])]).await;
        assert!(controller.store().shows_starters());

        controller.submit(TurnInput::Starter(1)).await;

        assert_eq!(controller.messages()[1].content, CONVERSATION_STARTERS[1]);
        assert!(matches!(&model.calls()[0], Call::Chat { text, .. } if text == CONVERSATION_STARTERS[1]));
        assert!(!controller.store().shows_starters());
    }

    #[tokio::test]
    async fn test_scenario_opens_role_play() {
        let (mut controller, model, _) =
            setup(vec![Script::Chunks(vec![chunk("That sounds hard.")])]).await;

        assert_eq!(
            controller.submit(TurnInput::Scenario(7)).await,
            TurnOutcome::Rejected(RejectReason::UnknownScenario)
        );
        assert_eq!(
            controller.submit(TurnInput::Scenario(0)).await,
            TurnOutcome::Completed
        );

        assert_eq!(controller.messages()[1].content, SCENARIOS[0].opening);
        assert!(matches!(&model.calls()[0], Call::Chat { text, .. } if text == SCENARIOS[0].opening));
    }
}

#[cfg(test)]
mod feedback_and_history_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_feedback_toggles() {
        let (mut controller, _, _) = setup(vec![Script::Chunks(vec![chunk("Reply")])]).await;
        controller.submit(TurnInput::Text("Hi".into())).await;
        let reply_id = controller.messages()[2].id.clone();

        controller.give_feedback(&reply_id, Feedback::Up).await;
        assert_eq!(controller.messages()[2].feedback, Some(Feedback::Up));

        controller.give_feedback(&reply_id, Feedback::Up).await;
        assert_eq!(controller.messages()[2].feedback, None);

        controller.give_feedback(&reply_id, Feedback::Up).await;
        controller.give_feedback(&reply_id, Feedback::Down).await;
        assert_eq!(controller.messages()[2].feedback, Some(Feedback::Down));

        controller.give_feedback("missing", Feedback::Up).await;
        assert_eq!(controller.messages().len(), 3);
    }

    #[tokio::test]
    async fn test_turn_is_persisted_and_reloaded() {
        let (mut controller, _, storage) = setup(vec![Script::Chunks(vec![
            Ok(ResponseChunk::text("Cited [1]").with_sources(vec![Citation::new("https://a", "A")])),
        ])])
        .await;
        controller.submit(TurnInput::Text("Hi".into())).await;
        let reply_id = controller.messages()[2].id.clone();
        controller.give_feedback(&reply_id, Feedback::Up).await;
        let expected = controller.messages().to_vec();

        let resumed = SessionContext::resume(storage)
            .await
            .unwrap()
            .expect("session should resume");
        assert_eq!(resumed.username(), "tester");
        assert_eq!(resumed.store().messages(), expected.as_slice());
    }

    #[tokio::test]
    async fn test_clear_resets_to_greeting() {
        let (mut controller, _, storage) = setup(vec![Script::Chunks(vec![chunk("Reply")])]).await;
        controller.submit(TurnInput::Text("Hi".into())).await;
        assert!(storage
            .get_snapshot(&history_key("tester"))
            .await
            .unwrap()
            .is_some());

        controller.clear_history().await;

        assert_eq!(controller.messages().len(), 1);
        assert!(controller.store().shows_starters());
        assert!(storage
            .get_snapshot(&history_key("tester"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_logout_forgets_user_and_history() {
        let (mut controller, _, storage) = setup(vec![Script::Chunks(vec![chunk("Reply")])]).await;
        controller.submit(TurnInput::Text("Hi".into())).await;

        controller.logout().await;

        assert!(controller.is_ended());
        assert!(storage.get_active_user().await.unwrap().is_none());
        assert!(storage
            .get_snapshot(&history_key("tester"))
            .await
            .unwrap()
            .is_none());
    }
}

#[cfg(test)]
mod actor_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_single_flight_while_streaming() {
        let (release, gate) = oneshot::channel();
        let (controller, model, _) = setup(vec![Script::Gated {
            before: vec![chunk("partial")],
            gate,
            after: vec![chunk(" rest")],
        }])
        .await;
        let greeting_id = controller.messages()[0].id.clone();

        let (handle, task) = controller.spawn();
        let mut events = handle.subscribe();

        handle.send(UserAction::Submit("first".into())).await.unwrap();
        wait_for(&mut events, |e| matches!(e, ControllerEvent::ChunkApplied { .. })).await;

        handle.send(UserAction::Submit("second".into())).await.unwrap();
        handle.send(UserAction::SelectStarter(0)).await.unwrap();
        handle.send(UserAction::Summarize).await.unwrap();
        for _ in 0..3 {
            assert_eq!(
                next_event(&mut events).await,
                ControllerEvent::SubmitRejected {
                    reason: RejectReason::TurnInFlight
                }
            );
        }

        // feedback applies mid-stream
        handle
            .send(UserAction::Feedback {
                message_id: greeting_id.clone(),
                value: Feedback::Up,
            })
            .await
            .unwrap();
        wait_for(&mut events, |e| matches!(e, ControllerEvent::FeedbackChanged { .. })).await;

        release.send(()).unwrap();
        assert_eq!(
            wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnFinished { .. })).await,
            ControllerEvent::TurnFinished {
                outcome: TurnOutcome::Completed
            }
        );

        let messages = handle.history().await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].feedback, Some(Feedback::Up));
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[2].content, "partial rest");
        assert_eq!(model.calls().len(), 1);

        drop(handle);
        let controller = task.await.unwrap();
        assert_eq!(controller.state(), TurnState::Idle);
    }

    async fn user_messages(handle: &inclusion_coach::ControllerHandle) -> Vec<String> {
        handle
            .history()
            .await
            .unwrap()
            .into_iter()
            .filter(|m| !m.is_ai())
            .map(|m| m.content)
            .collect()
    }

    #[tokio::test]
    async fn test_submit_while_stream_opens_is_rejected() {
        for then in [
            Script::FailOpen,
            Script::Chunks(vec![chunk("ready")]),
        ] {
            let (controller, model, _) = setup(vec![Script::SlowOpen(
                Duration::from_millis(300),
                Box::new(then),
            )])
            .await;
            let (handle, task) = controller.spawn();
            let mut events = handle.subscribe();

            handle.send(UserAction::Submit("first".into())).await.unwrap();
            wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnStarted { .. })).await;
            handle.send(UserAction::Submit("second".into())).await.unwrap();

            assert_eq!(
                wait_for(&mut events, |e| !matches!(e, ControllerEvent::ChunkApplied { .. })).await,
                ControllerEvent::SubmitRejected {
                    reason: RejectReason::TurnInFlight
                }
            );
            wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnFinished { .. })).await;

            assert_eq!(user_messages(&handle).await, vec!["first".to_string()]);
            assert_eq!(model.calls().len(), 1);

            drop(handle);
            task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_back_to_back_submits_with_ready_stream() {
        let (controller, model, _) = setup(vec![
            Script::Chunks(vec![chunk("a"), chunk("b"), chunk("c")]),
            Script::Chunks(vec![chunk("never")]),
        ])
        .await;
        let (handle, task) = controller.spawn();
        let mut events = handle.subscribe();

        handle.send(UserAction::Submit("first".into())).await.unwrap();
        handle.send(UserAction::Submit("second".into())).await.unwrap();

        assert_eq!(
            wait_for(&mut events, |e| matches!(e, ControllerEvent::SubmitRejected { .. })).await,
            ControllerEvent::SubmitRejected {
                reason: RejectReason::TurnInFlight
            }
        );
        wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnFinished { .. })).await;

        let messages = handle.history().await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "abc");
        assert_eq!(model.calls().len(), 1);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_while_stream_opens_abandons_turn() {
        let (controller, model, _) = setup(vec![Script::SlowOpen(
            Duration::from_millis(300),
            Box::new(Script::Chunks(vec![chunk("late")])),
        )])
        .await;
        let (handle, task) = controller.spawn();
        let mut events = handle.subscribe();

        handle.send(UserAction::Submit("first".into())).await.unwrap();
        wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnStarted { .. })).await;
        handle.send(UserAction::ClearHistory).await.unwrap();

        assert_eq!(
            wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnFinished { .. })).await,
            ControllerEvent::TurnFinished {
                outcome: TurnOutcome::Abandoned
            }
        );
        assert_eq!(handle.history().await.unwrap().len(), 1);
        assert_eq!(model.calls().len(), 1);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_mid_stream_abandons_turn() {
        let (_release, gate) = oneshot::channel();
        let (controller, _, storage) = setup(vec![
            Script::Gated {
                before: vec![chunk("partial")],
                gate,
                after: vec![chunk(" never")],
            },
            Script::Chunks(vec![chunk("Fresh")]),
        ])
        .await;

        let (handle, task) = controller.spawn();
        let mut events = handle.subscribe();

        handle.send(UserAction::Submit("first".into())).await.unwrap();
        wait_for(&mut events, |e| matches!(e, ControllerEvent::ChunkApplied { .. })).await;

        handle.send(UserAction::ClearHistory).await.unwrap();
        assert_eq!(next_event(&mut events).await, ControllerEvent::HistoryCleared);
        assert_eq!(
            wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnFinished { .. })).await,
            ControllerEvent::TurnFinished {
                outcome: TurnOutcome::Abandoned
            }
        );
        assert_eq!(handle.history().await.unwrap().len(), 1);
        assert!(storage
            .get_snapshot(&history_key("tester"))
            .await
            .unwrap()
            .is_none());

        // the controller is idle again
        handle.send(UserAction::Submit("again".into())).await.unwrap();
        wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnFinished { .. })).await;
        let messages = handle.history().await.unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "Fresh");

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_mid_stream_stops_actor() {
        let (_release, gate) = oneshot::channel();
        let (controller, _, storage) = setup(vec![Script::Gated {
            before: vec![chunk("partial")],
            gate,
            after: vec![],
        }])
        .await;

        let (handle, task) = controller.spawn();
        let mut events = handle.subscribe();

        handle.send(UserAction::Submit("first".into())).await.unwrap();
        wait_for(&mut events, |e| matches!(e, ControllerEvent::ChunkApplied { .. })).await;
        handle.send(UserAction::Logout).await.unwrap();

        let controller = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("actor should stop after logout")
            .unwrap();
        assert!(controller.is_ended());
        assert!(storage.get_active_user().await.unwrap().is_none());
        assert!(handle.send(UserAction::ToggleDeepDive).await.is_err());
    }

    #[tokio::test]
    async fn test_mode_actions_through_actor() {
        let (controller, model, _) = setup(vec![Script::Chunks(vec![chunk("ok")])]).await;
        let (handle, task) = controller.spawn();
        let mut events = handle.subscribe();

        handle
            .send(UserAction::Attach(document("plan.pdf")))
            .await
            .unwrap();
        assert_eq!(
            next_event(&mut events).await,
            ControllerEvent::AttachmentChanged {
                file_name: Some("plan.pdf".to_string())
            }
        );
        assert_eq!(
            next_event(&mut events).await,
            ControllerEvent::DeepDiveChanged { enabled: true }
        );

        handle.send(UserAction::Submit(String::new())).await.unwrap();
        wait_for(&mut events, |e| matches!(e, ControllerEvent::TurnFinished { .. })).await;

        drop(handle);
        let controller = task.await.unwrap();
        assert!(!controller.composer().deep_dive_enabled());
        assert_eq!(
            model.calls(),
            vec![Call::DeepDive {
                text: "Analyze the document: plan.pdf".to_string(),
                attachment: Some("plan.pdf".to_string()),
            }]
        );
    }
}
