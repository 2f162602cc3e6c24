use serde::{Deserialize, Serialize};

use crate::chat::{Author, Citation, ResponseChunk};

/// Content block in a Gemini conversation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    /// `user` or `model`; absent on system instructions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Ordered parts of the turn
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// One part of a content block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Plain text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Embedded document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
    /// Set on thought-summary parts, which are not part of the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,
}

/// Base64 document payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    /// Document MIME type
    pub mime_type: String,
    /// Standard base64 of the file bytes
    pub data: String,
}

/// Tool attached to a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Enables search grounding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<GoogleSearch>,
}

/// Google Search grounding; carries no options
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GoogleSearch {}

/// Generation options
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Reasoning budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Thinking budget for reasoning models
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Maximum thinking tokens
    pub thinking_budget: u32,
}

/// Body of a `streamGenerateContent` call
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// Conversation turns, oldest first
    pub contents: Vec<Content>,
    /// Persona prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    /// Tools the model may call
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Generation options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

/// One server-sent chunk of a streamed reply
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Reply candidates; only the first is used
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Present when the server aborts mid-stream.
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

/// A reply candidate
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Text of this chunk
    #[serde(default)]
    pub content: Option<Content>,
    /// Sources behind this chunk
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
    /// Set on the final chunk
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Search grounding attached to a candidate
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    /// Sources in citation order
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

/// One grounding source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroundingChunk {
    /// Web page, when the source is one
    #[serde(default)]
    pub web: Option<WebSource>,
}

/// Web page behind a grounding chunk
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebSource {
    /// Page address
    #[serde(default)]
    pub uri: Option<String>,
    /// Page title
    #[serde(default)]
    pub title: Option<String>,
}

/// Error object returned by the API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    /// HTTP-style status code
    #[serde(default)]
    pub code: u16,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
    /// Canonical status name
    #[serde(default)]
    pub status: Option<String>,
}

impl Content {
    /// A user turn with one text part
    pub fn user(text: impl Into<String>) -> Self {
        Self::with_role("user", vec![Part::text(text)])
    }

    /// A model turn with one text part
    pub fn model(text: impl Into<String>) -> Self {
        Self::with_role("model", vec![Part::text(text)])
    }

    /// A system instruction
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
        }
    }

    /// A turn for `role` with the given parts
    pub fn with_role(role: &str, parts: Vec<Part>) -> Self {
        Self {
            role: Some(role.to_string()),
            parts,
        }
    }

    /// Map a stored message author to the API role
    pub fn role_for(author: Author) -> &'static str {
        match author {
            Author::User => "user",
            Author::Ai => "model",
        }
    }
}

impl Part {
    /// A text part
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// An inline document part; `data` is already base64-encoded
    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            ..Self::default()
        }
    }
}

impl GenerateContentRequest {
    /// A request over the given contents
    pub fn new(contents: Vec<Content>) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }

    /// Set the system instruction
    pub fn with_system_instruction(mut self, text: impl Into<String>) -> Self {
        self.system_instruction = Some(Content::system(text));
        self
    }

    /// Enable Google Search grounding
    pub fn with_search(mut self) -> Self {
        self.tools.push(Tool {
            google_search: Some(GoogleSearch::default()),
        });
        self
    }

    /// Set the thinking budget
    pub fn with_thinking_budget(mut self, budget: u32) -> Self {
        self.generation_config
            .get_or_insert_with(GenerationConfig::default)
            .thinking_config = Some(ThinkingConfig {
            thinking_budget: budget,
        });
        self
    }
}

impl GenerateContentResponse {
    /// Reply text in this chunk, thought parts excluded
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| p.thought != Some(true))
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    /// Grounding sources in this chunk; a missing title falls back to the uri
    pub fn sources(&self) -> Vec<Citation> {
        self.candidates
            .iter()
            .filter_map(|c| c.grounding_metadata.as_ref())
            .flat_map(|m| m.grounding_chunks.iter())
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| {
                let uri = web.uri.as_deref().filter(|u| !u.is_empty())?;
                let title = web
                    .title
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .unwrap_or(uri);
                Some(Citation::new(uri, title))
            })
            .collect()
    }

    /// Convert to the chunk applied to the reply
    pub fn into_chunk(self) -> ResponseChunk {
        ResponseChunk::text(self.text()).with_sources(self.sources())
    }
}
