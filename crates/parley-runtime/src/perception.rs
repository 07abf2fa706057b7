//! Perception: camera frame in, [`Observation`] out.
//!
//! [`VlmPerception`] ships the frame to an OpenAI-compatible vision model as
//! an inline `data:` URL and asks for JSON matching the [`Observation`]
//! schema. The reply parser is lenient: code fences and surrounding chatter
//! are stripped, status and obstacle names are normalised, and the older
//! `actions: [{.., "Goal_observed": "TRUE"}]` hint shape is understood too.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use parley_hal::CameraFrame;
use parley_types::{Mode, Observation, ObservationStatus};
use schemars::schema_for;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::llm_driver::{ChatMessage, CompletionOptions, LlmDriver, LlmError};

#[derive(Error, Debug)]
pub enum PerceptionError {
    #[error("vision model request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("vision model reply is not an observation: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Perception: Send + Sync {
    /// Describe `frame` in the light of `mode` and the current `target`.
    async fn perceive(
        &self,
        frame: &CameraFrame,
        mode: Mode,
        target: &str,
    ) -> Result<Observation, PerceptionError>;
}

const NAVIGATION_PROMPT: &str = "You are the eyes of a mobile robot. Its current target is: \
{target}. Look at the image and report what matters for driving toward the target. \
Answer ONLY with a JSON object with these fields: \
\"status\" (\"OK\" if the way ahead is free, \"BLOCKED\" otherwise), \
\"description\" (one sentence describing the scene), \
\"obstacles\" (list of lower-case categories of things in the way, e.g. \"person\", \"chair\"), \
\"goal_observed\" (true only if the target is clearly visible), \
\"suggested_actions\" (short movement hints such as \"turn left\").";

const INTERACTION_PROMPT: &str = "You are the eyes of a mobile robot that is talking to \
someone blocking its way toward: {target}. Look at the image and report whether the person \
is still in the way. Answer ONLY with a JSON object with these fields: \
\"status\" (\"OK\" or \"BLOCKED\"), \"description\" (one sentence), \
\"obstacles\" (list of lower-case categories still in the way), \
\"goal_observed\" (true only if the target is clearly visible), \
\"suggested_actions\" (short hints).";

/// Perception backed by a vision language model.
pub struct VlmPerception {
    driver: Arc<LlmDriver>,
    max_tokens: u32,
}

impl VlmPerception {
    pub fn new(driver: Arc<LlmDriver>) -> Self {
        Self {
            driver,
            max_tokens: 300,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl Perception for VlmPerception {
    async fn perceive(
        &self,
        frame: &CameraFrame,
        mode: Mode,
        target: &str,
    ) -> Result<Observation, PerceptionError> {
        let schema = serde_json::to_value(schema_for!(Observation))
            .map_err(|e| PerceptionError::Malformed(e.to_string()))?;
        let options = CompletionOptions {
            max_tokens: Some(self.max_tokens),
            json_schema: Some(("observation".to_string(), schema)),
        };
        let messages = [ChatMessage::user_with_image(
            prompt_for(mode, target),
            data_url(frame),
        )];

        let raw = self.driver.complete(&messages, &options).await?;
        debug!(%mode, frame = frame.sequence, reply = %raw, "vision model reply");
        parse_observation(&raw)
    }
}

pub fn prompt_for(mode: Mode, target: &str) -> String {
    let template = match mode {
        Mode::Navigation => NAVIGATION_PROMPT,
        Mode::Interaction => INTERACTION_PROMPT,
    };
    template.replace("{target}", target)
}

/// `data:<mime>;base64,<payload>` for an encoded frame.
pub fn data_url(frame: &CameraFrame) -> String {
    format!(
        "data:{};base64,{}",
        frame.encoding.mime_type(),
        BASE64_STANDARD.encode(&frame.data)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Reply parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawObservation {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    obstacles: Vec<String>,
    #[serde(default)]
    goal_observed: Option<bool>,
    #[serde(default, alias = "actions")]
    suggested_actions: Vec<Value>,
}

/// Parse a vision model reply into an [`Observation`].
///
/// # Errors
///
/// [`PerceptionError::Malformed`] when no JSON object can be found.
pub fn parse_observation(raw: &str) -> Result<Observation, PerceptionError> {
    let json = extract_object(raw)
        .ok_or_else(|| PerceptionError::Malformed(format!("no JSON object in {raw:?}")))?;
    let parsed: RawObservation =
        serde_json::from_str(json).map_err(|e| PerceptionError::Malformed(e.to_string()))?;

    let status = match parsed.status.as_deref().map(str::trim) {
        None => ObservationStatus::Ok,
        Some(s) if s.eq_ignore_ascii_case("ok") => ObservationStatus::Ok,
        Some(s) if s.eq_ignore_ascii_case("blocked") => ObservationStatus::Blocked,
        Some(_) => ObservationStatus::Unknown,
    };
    let goal_observed = parsed
        .goal_observed
        .unwrap_or_else(|| parsed.suggested_actions.iter().any(hint_reports_goal));

    Ok(Observation {
        status,
        description: parsed.description.trim().to_string(),
        obstacles: parsed
            .obstacles
            .iter()
            .map(|o| o.trim().to_lowercase())
            .filter(|o| !o.is_empty())
            .collect(),
        goal_observed,
        suggested_actions: parsed
            .suggested_actions
            .into_iter()
            .map(|hint| match hint {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
    })
}

fn hint_reports_goal(hint: &Value) -> bool {
    match hint.get("Goal_observed") {
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

/// The outermost `{ ... }` span, ignoring fences and prose around it.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}
