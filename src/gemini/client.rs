use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures::StreamExt;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::sse::SseDecoder;
use super::types::{Content, GenerateContentRequest, GenerateContentResponse, Part};
use crate::chat::{Attachment, ChunkStream, Message, ModelService, ResponseChunk};
use crate::config::{GeminiConfig, RequestConfig};
use crate::error::{ModelError, ModelResult};
use crate::prompts::SYSTEM_PROMPT;

/// Streaming client for the Gemini `streamGenerateContent` API
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    deep_dive_model: String,
    thinking_budget: u32,
    search_grounding: bool,
    request_config: RequestConfig,
}

impl GeminiClient {
    /// Create a new Gemini client
    pub fn new(config: &GeminiConfig, request_config: RequestConfig) -> ModelResult<Self> {
        // Idle timeout per read, not a total deadline: a long reply keeps streaming.
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(request_config.connect_timeout_ms))
            .read_timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(ModelError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            chat_model: config.chat_model.clone(),
            deep_dive_model: config.deep_dive_model.clone(),
            thinking_budget: config.thinking_budget,
            search_grounding: config.search_grounding,
            request_config,
        })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build the multi-turn chat body: prior history, then the new user text
    pub fn chat_request(&self, history: &[Message], text: &str) -> GenerateContentRequest {
        let mut contents: Vec<Content> = history
            .iter()
            .filter(|m| !m.content.is_empty())
            .map(|m| Content::with_role(Content::role_for(m.author), vec![Part::text(&m.content)]))
            .collect();
        contents.push(Content::user(text));

        let request = GenerateContentRequest::new(contents).with_system_instruction(SYSTEM_PROMPT);
        if self.search_grounding {
            request.with_search()
        } else {
            request
        }
    }

    /// Build the single-shot analysis body: optional document, then the text
    pub fn deep_dive_request(
        &self,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> GenerateContentRequest {
        let mut parts = Vec::with_capacity(2);
        if let Some(doc) = attachment {
            parts.push(Part::inline(&doc.mime_type, STANDARD.encode(&doc.data)));
        }
        parts.push(Part::text(text));

        GenerateContentRequest::new(vec![Content::with_role("user", parts)])
            .with_system_instruction(SYSTEM_PROMPT)
            .with_thinking_budget(self.thinking_budget)
    }

    /// Open a reply stream against `model`, retrying until bytes start flowing
    pub async fn stream_generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> ModelResult<ChunkStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        );

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Gemini request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.open_stream(&url, request).await {
                Ok(response) => {
                    info!(
                        model = %model,
                        latency_ms = start.elapsed().as_millis(),
                        "Gemini stream opened"
                    );
                    return Ok(decode_stream(response, self.request_config.timeout_ms));
                }
                Err(e) => {
                    error!(
                        model = %model,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Gemini request failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(ModelError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn open_stream(
        &self,
        url: &str,
        request: &GenerateContentRequest,
    ) -> ModelResult<reqwest::Response> {
        debug!(
            contents = request.contents.len(),
            tools = request.tools.len(),
            "Calling Gemini"
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| transport_error(e, self.request_config.timeout_ms))?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ModelService for GeminiClient {
    async fn stream_chat(&self, history: &[Message], text: &str) -> ModelResult<ChunkStream> {
        let request = self.chat_request(history, text);
        self.stream_generate(&self.chat_model, &request).await
    }

    async fn stream_deep_dive(
        &self,
        text: &str,
        attachment: Option<&Attachment>,
    ) -> ModelResult<ChunkStream> {
        let request = self.deep_dive_request(text, attachment);
        self.stream_generate(&self.deep_dive_model, &request).await
    }
}

fn transport_error(e: reqwest::Error, timeout_ms: u64) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout { timeout_ms }
    } else {
        ModelError::Http(e)
    }
}

/// Decode one `data:` payload; `None` when it carries nothing to apply
fn parse_payload(data: &str) -> ModelResult<Option<ResponseChunk>> {
    let response: GenerateContentResponse =
        serde_json::from_str(data).map_err(|e| ModelError::Stream {
            message: format!("Failed to parse stream chunk: {}", e),
        })?;

    if let Some(err) = response.error {
        return Err(ModelError::Api {
            status: err.code,
            message: err.message,
        });
    }

    let chunk = response.into_chunk();
    Ok((!chunk.is_empty()).then_some(chunk))
}

fn decode_stream(response: reqwest::Response, timeout_ms: u64) -> ChunkStream {
    let mut body = response.bytes_stream();

    Box::pin(async_stream::stream! {
        let mut decoder = SseDecoder::default();

        while let Some(bytes) = body.next().await {
            let bytes = match bytes {
                Ok(bytes) => bytes,
                Err(e) => {
                    let err = if e.is_timeout() {
                        ModelError::Timeout { timeout_ms }
                    } else {
                        ModelError::Stream { message: e.to_string() }
                    };
                    yield Err(err);
                    return;
                }
            };

            for data in decoder.push(&bytes) {
                match parse_payload(&data) {
                    Ok(Some(chunk)) => yield Ok(chunk),
                    Ok(None) => {}
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }

        if let Some(data) = decoder.finish() {
            match parse_payload(&data) {
                Ok(Some(chunk)) => yield Ok(chunk),
                Ok(None) => {}
                Err(e) => yield Err(e),
            }
        }
    })
}
