use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::prompts::GREETING;

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    /// The person using the coach.
    User,
    /// The model.
    Ai,
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Author::User => write!(f, "user"),
            Author::Ai => write!(f, "ai"),
        }
    }
}

impl std::str::FromStr for Author {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Author::User),
            "ai" => Ok(Author::Ai),
            _ => Err(format!("Unknown author: {}", s)),
        }
    }
}

/// A grounding source attached to an AI reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Unique identifier of the source.
    pub uri: String,
    /// Display label.
    pub title: String,
}

impl Citation {
    /// Create a citation
    pub fn new(uri: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            title: title.into(),
        }
    }
}

/// Thumbs rating on an AI reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    /// Helpful.
    Up,
    /// Not helpful.
    Down,
}

impl Feedback {
    /// Toggle-to-none: choosing the current value again clears it.
    pub fn toggle(current: Option<Feedback>, requested: Feedback) -> Option<Feedback> {
        if current == Some(requested) {
            None
        } else {
            Some(requested)
        }
    }
}

impl std::fmt::Display for Feedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Feedback::Up => write!(f, "up"),
            Feedback::Down => write!(f, "down"),
        }
    }
}

impl std::str::FromStr for Feedback {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(Feedback::Up),
            "down" => Ok(Feedback::Down),
            _ => Err(format!("Unknown feedback: {}", s)),
        }
    }
}

/// One conversation turn as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique within the conversation.
    pub id: String,
    /// Who wrote it.
    pub author: Author,
    /// Text; grows while an AI reply streams.
    pub content: String,
    /// Grounding sources, unique by uri. AI messages only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Citation>,
    /// User rating. AI messages only.
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

impl Message {
    /// A user message with fixed content
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: new_id("user"),
            author: Author::User,
            content: content.into(),
            sources: Vec::new(),
            feedback: None,
        }
    }

    /// An AI message with the given content
    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            id: new_id("ai"),
            author: Author::Ai,
            content: content.into(),
            sources: Vec::new(),
            feedback: None,
        }
    }

    /// An empty AI message that a streamed reply will fill
    pub fn placeholder() -> Self {
        Self::ai(String::new())
    }

    /// The seed greeting every conversation starts with
    pub fn greeting() -> Self {
        Self {
            id: new_id("greeting"),
            ..Self::ai(GREETING)
        }
    }

    /// An AI error message, used when there is no placeholder to overwrite
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            id: new_id("error"),
            ..Self::ai(content)
        }
    }

    /// Attach sources
    pub fn with_sources(mut self, sources: Vec<Citation>) -> Self {
        self.sources = sources;
        self
    }

    /// Whether the model wrote this message
    pub fn is_ai(&self) -> bool {
        self.author == Author::Ai
    }
}

fn new_id(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}
