//! [`LlmDriver`] – OpenAI-compatible chat-completions client.
//!
//! Talks to any server exposing `/v1/chat/completions` (OpenAI, Ollama, vLLM,
//! …). Every request carries a bounded timeout so a stalled model server can
//! never hang the control tick.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use parley_runtime::llm_driver::{ChatMessage, CompletionOptions, LlmDriver};
//!
//! # async fn demo() -> Result<(), parley_runtime::llm_driver::LlmError> {
//! let driver = LlmDriver::new("http://localhost:11434", "llama3", None, Duration::from_secs(20))?;
//! let reply = driver
//!     .complete(
//!         &[ChatMessage::system("You are a polite robot."), ChatMessage::user("Hi!")],
//!         &CompletionOptions::with_max_tokens(60),
//!     )
//!     .await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from LLM driver operations.
#[derive(Error, Debug)]
pub enum LlmError {
    /// The HTTP request to the model server failed or timed out.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The response from the model server could not be parsed.
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

/// The role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Plain text, or a list of typed parts for multimodal requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    /// Usually a `data:<mime>;base64,<payload>` URL.
    pub url: String,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A user message carrying text followed by one inline image.
    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    /// The text of the message, ignoring image parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// Per-request knobs.
#[derive(Debug, Clone, Default)]
pub struct CompletionOptions {
    pub max_tokens: Option<u32>,
    /// JSON Schema the reply must conform to (sent as `response_format`).
    pub json_schema: Option<(String, serde_json::Value)>,
}

impl CompletionOptions {
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            json_schema: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal request / response shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
}

/// `response_format` field that enforces structured JSON Schema output.
#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// LlmDriver
// ─────────────────────────────────────────────────────────────────────────────

/// An async client for an OpenAI-compatible chat-completions endpoint.
///
/// Construct once and share; the underlying connection pool is reused.
pub struct LlmDriver {
    base_url: String,
    model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl LlmDriver {
    /// Create a driver pointing at `base_url` using `model`. Every request is
    /// abandoned after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `messages` to the model and return the assistant's reply text,
    /// trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Http`] if the request fails or times out, or
    /// [`LlmError::BadResponse`] if the response shape is unexpected.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = build_request(&self.model, messages, options);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        debug!(model = %self.model, messages = messages.len(), "chat completion request");

        let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}

fn build_request<'a>(
    model: &'a str,
    messages: &'a [ChatMessage],
    options: &'a CompletionOptions,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages,
        stream: false,
        max_tokens: options.max_tokens,
        response_format: options
            .json_schema
            .as_ref()
            .map(|(name, schema)| ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat { name, schema },
            }),
    }
}
