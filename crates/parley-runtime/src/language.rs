//! Language collaborators used by the negotiation session.
//!
//! - [`Generator`] produces robot utterances from a chat context.
//! - [`Classifier`] labels a human reply as positive, negative or neutral.
//! - [`PromptSet`] holds the text that seeds both.
//!
//! [`LlmGenerator`] and [`LlmClassifier`] implement the traits on top of a
//! shared [`LlmDriver`].

use std::sync::Arc;

use async_trait::async_trait;
use parley_types::{Marker, Sentiment};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm_driver::{ChatMessage, CompletionOptions, LlmDriver, Role};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
#[error("utterance generation failed: {0}")]
pub struct GenerationError(pub String);

#[derive(Error, Debug)]
#[error("utterance classification failed: {0}")]
pub struct ClassificationError(pub String);

// ─────────────────────────────────────────────────────────────────────────────
// Collaborator traits
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the next robot utterance for `context`, using at most
    /// `max_tokens` tokens.
    async fn generate(
        &self,
        context: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Sentiment, ClassificationError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompts
// ─────────────────────────────────────────────────────────────────────────────

/// A worked example shown to the generator before the live history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptExample {
    pub role: Role,
    pub content: String,
}

/// Text templates for the negotiation.
///
/// Placeholders: `{name}` and `{goal}` in `system` and `greeting`,
/// `{marker}` in `farewell`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSet {
    pub robot_name: String,
    pub system: String,
    pub examples: Vec<PromptExample>,
    pub greeting: String,
    pub farewell: String,
    pub classifier: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            robot_name: "Tiago".to_string(),
            system: "You are {name}, a friendly assistant robot working in an office \
                     building. Your mission is to {goal}, but a person is blocking your \
                     way. Politely persuade them to let you through. Reply with one or two \
                     short sentences. When the person agrees to move, end your reply with \
                     #CLEAR_PATH. If they firmly refuse, end it with #REJECTED. If they \
                     stop answering, end it with #NO_RESPONSE."
                .to_string(),
            examples: vec![
                PromptExample {
                    role: Role::User,
                    content: "What do you want?".to_string(),
                },
                PromptExample {
                    role: Role::Assistant,
                    content: "I need to get past you to reach my destination. Could you \
                              step aside for a moment, please?"
                        .to_string(),
                },
                PromptExample {
                    role: Role::User,
                    content: "Sure, go ahead.".to_string(),
                },
                PromptExample {
                    role: Role::Assistant,
                    content: "Thank you very much, have a nice day! #CLEAR_PATH".to_string(),
                },
            ],
            greeting: "Hello, I am {name}, the building's assistant robot. My mission is to \
                       {goal}."
                .to_string(),
            farewell: "Say one short, cordial goodbye sentence and end it EXACTLY with \
                       {marker}."
                .to_string(),
            classifier: "Answer only positive, negative or neutral: positive if the person \
                         agrees to move out of the way, negative if they refuse, neutral \
                         otherwise."
                .to_string(),
        }
    }
}

impl PromptSet {
    pub fn system_prompt(&self, goal: &str) -> String {
        self.fill(&self.system, goal)
    }

    pub fn greeting_for(&self, goal: &str) -> String {
        self.fill(&self.greeting, goal)
    }

    pub fn farewell_instruction(&self, marker: Marker) -> String {
        self.farewell.replace("{marker}", marker.token())
    }

    pub fn example_messages(&self) -> impl Iterator<Item = ChatMessage> + '_ {
        self.examples
            .iter()
            .map(|e| ChatMessage::new(e.role, e.content.clone()))
    }

    fn fill(&self, template: &str, goal: &str) -> String {
        template
            .replace("{name}", &self.robot_name)
            .replace("{goal}", goal)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM-backed implementations
// ─────────────────────────────────────────────────────────────────────────────

pub struct LlmGenerator {
    driver: Arc<LlmDriver>,
}

impl LlmGenerator {
    pub fn new(driver: Arc<LlmDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(
        &self,
        context: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let reply = self
            .driver
            .complete(context, &CompletionOptions::with_max_tokens(max_tokens))
            .await
            .map_err(|e| GenerationError(e.to_string()))?;
        if reply.is_empty() {
            return Err(GenerationError("model returned an empty utterance".into()));
        }
        Ok(reply)
    }
}

pub struct LlmClassifier {
    driver: Arc<LlmDriver>,
    instruction: String,
}

impl LlmClassifier {
    pub fn new(driver: Arc<LlmDriver>, instruction: impl Into<String>) -> Self {
        Self {
            driver,
            instruction: instruction.into(),
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<Sentiment, ClassificationError> {
        let messages = [
            ChatMessage::system(self.instruction.clone()),
            ChatMessage::user(text),
        ];
        let raw = self
            .driver
            .complete(&messages, &CompletionOptions::with_max_tokens(3))
            .await
            .map_err(|e| ClassificationError(e.to_string()))?;
        Ok(Sentiment::parse(&raw))
    }
}
