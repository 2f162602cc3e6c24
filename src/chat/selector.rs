//! Mode and attachment selection for the next turn.
//!
//! The [`Composer`] holds the deep-dive toggle and the attached document
//! between turns and turns user input into a [`TurnRequest`].

use serde::{Deserialize, Serialize};

use super::attachment::Attachment;
use crate::prompts::{
    ANALYZE_DOCUMENT_PREFIX, CONVERSATION_STARTERS, SCENARIOS, SUMMARIZE_INSTRUCTION,
};

/// Shape of the outbound model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallShape {
    /// Multi-turn call with the full prior history.
    Chat,
    /// Single-shot analysis call without history.
    DeepDive,
}

impl std::fmt::Display for CallShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallShape::Chat => write!(f, "chat"),
            CallShape::DeepDive => write!(f, "deep_dive"),
        }
    }
}

/// Pick the call shape for a turn.
pub fn select_call_shape(deep_dive_enabled: bool, has_attachment: bool) -> CallShape {
    if deep_dive_enabled || has_attachment {
        CallShape::DeepDive
    } else {
        CallShape::Chat
    }
}

/// What the user asked for when starting a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// Typed text, possibly empty when a document is attached.
    Text(String),
    /// The summarize shortcut next to an attached document.
    Summarize,
    /// One of the conversation starters, by index.
    Starter(usize),
    /// Opening prompt of a guided scenario, by index.
    Scenario(usize),
}

/// A fully decided turn, ready to dispatch.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Content of the user message and of the prompt.
    pub text: String,
    /// Which model call answers it.
    pub shape: CallShape,
    /// Document sent with a deep-dive call.
    pub attachment: Option<Attachment>,
}

/// Why a turn did not start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Another turn is still in flight.
    TurnInFlight,
    /// No text and no attachment.
    Empty,
    /// Summarize requested without a document.
    NoAttachment,
    /// Starter index out of range.
    UnknownStarter,
    /// Scenario index out of range.
    UnknownScenario,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::TurnInFlight => write!(f, "a reply is still streaming"),
            RejectReason::Empty => write!(f, "nothing to send"),
            RejectReason::NoAttachment => write!(f, "no document attached"),
            RejectReason::UnknownStarter => write!(f, "no such conversation starter"),
            RejectReason::UnknownScenario => write!(f, "no such scenario"),
        }
    }
}

/// Ephemeral state of the turn being answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnInFlight {
    /// Which model call is answering.
    pub shape: CallShape,
    /// File name of the document under analysis.
    pub attachment_label: Option<String>,
}

impl TurnInFlight {
    /// Headline shown while waiting for the first chunk
    pub fn headline(&self) -> &'static str {
        match self.shape {
            CallShape::Chat => "Thinking...",
            CallShape::DeepDive => "Performing Deep Dive Analysis...",
        }
    }

    /// Detail line shown under the headline, if any
    pub fn detail(&self) -> Option<String> {
        match (self.shape, &self.attachment_label) {
            (CallShape::Chat, _) => None,
            (CallShape::DeepDive, Some(name)) => Some(format!("Reviewing \"{}\"...", name)),
            (CallShape::DeepDive, None) => {
                Some("This may take a moment while I review the details.".to_string())
            }
        }
    }
}

/// Deep-dive toggle and attachment held between turns.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    /// The user's own toggle setting.
    deep_dive: bool,
    /// Toggle forced on by an attachment, until it is removed or a turn completes.
    forced: bool,
    attachment: Option<Attachment>,
}

impl Composer {
    /// Start with the given toggle setting
    pub fn new(deep_dive: bool) -> Self {
        Self {
            deep_dive,
            ..Self::default()
        }
    }

    /// Effective toggle state
    pub fn deep_dive_enabled(&self) -> bool {
        self.deep_dive || self.forced
    }

    /// Flip the toggle; returns the new effective state
    pub fn toggle_deep_dive(&mut self) -> bool {
        let next = !self.deep_dive_enabled();
        self.set_deep_dive(next)
    }

    /// Set the toggle explicitly; returns the new effective state
    pub fn set_deep_dive(&mut self, enabled: bool) -> bool {
        self.deep_dive = enabled;
        self.forced = false;
        self.deep_dive_enabled()
    }

    /// Attach a document; forces deep-dive on
    pub fn attach(&mut self, attachment: Attachment) {
        if !self.deep_dive {
            self.forced = true;
        }
        self.attachment = Some(attachment);
    }

    /// Drop the attached document and any forcing it caused
    pub fn remove_attachment(&mut self) -> Option<Attachment> {
        self.forced = false;
        self.attachment.take()
    }

    /// The attached document, if any
    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Placeholder hint for the input box
    pub fn input_hint(&self) -> String {
        match &self.attachment {
            Some(a) => format!("Ask a question about {}", a.file_name),
            None => "Ask the Inclusion Coach...".to_string(),
        }
    }

    /// Called when a turn finishes, successfully or not
    pub fn turn_completed(&mut self) {
        self.forced = false;
    }

    /// Decide the next turn from user input.
    ///
    /// On success the attachment is consumed; on rejection nothing changes.
    pub fn compose(&mut self, input: TurnInput) -> Result<TurnRequest, RejectReason> {
        let text = match input {
            TurnInput::Text(text) => {
                let text = text.trim();
                match (&self.attachment, text.is_empty()) {
                    (_, false) => text.to_string(),
                    (Some(a), true) => format!("{}{}", ANALYZE_DOCUMENT_PREFIX, a.file_name),
                    (None, true) => return Err(RejectReason::Empty),
                }
            }
            TurnInput::Summarize => {
                if self.attachment.is_none() {
                    return Err(RejectReason::NoAttachment);
                }
                SUMMARIZE_INSTRUCTION.to_string()
            }
            TurnInput::Starter(index) => CONVERSATION_STARTERS
                .get(index)
                .map(|s| s.to_string())
                .ok_or(RejectReason::UnknownStarter)?,
            TurnInput::Scenario(index) => SCENARIOS
                .get(index)
                .map(|s| s.opening.to_string())
                .ok_or(RejectReason::UnknownScenario)?,
        };

        let shape = select_call_shape(self.deep_dive_enabled(), self.attachment.is_some());
        Ok(TurnRequest {
            text,
            shape,
            attachment: self.attachment.take(),
        })
    }
}
