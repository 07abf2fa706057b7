//! [`NegotiationSession`] – turn-based protocol for talking a blocking human
//! out of the robot's way.
//!
//! The protocol engine ([`NegotiationSession`]) is stateless between calls;
//! everything that changes during a conversation lives in a
//! [`NegotiationState`] that the caller owns and lends out for each
//! [`interactive_turn`][NegotiationSession::interactive_turn].
//!
//! # One turn
//!
//! ```text
//! GREET (once) ─▶ ROBOT_TURN ──marker──▶ TERMINATED
//!                     │
//!                     ▼
//!                AWAIT_HUMAN ──silence limit / negative window──▶ TERMINATED
//!                     │
//!                     ▼
//!                 CLASSIFY ──positive / too many negatives──▶ TERMINATED
//!                     │
//!                     └──────────▶ next turn
//! ```
//!
//! Every farewell the session synthesises ends up carrying the marker of the
//! final tag: the generator is asked to include it and the session appends it
//! when the generator did not.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parley_types::{FinalTag, Marker, Role, Sentiment, Transcript, Turn};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::language::{Classifier, GenerationError, Generator, PromptSet};
use crate::llm_driver::ChatMessage;
use crate::speech::Speech;

/// Used when the generator cannot produce a farewell at all.
const CANNED_FAREWELL: &str = "Thank you for your time. Goodbye!";
/// Spoken when the language services are down and the session gives up.
const SERVICE_FAILURE_APOLOGY: &str =
    "Sorry, I am having trouble talking right now. I will find another way.";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    /// Mission goal quoted in the greeting and system prompt.
    pub goal: String,
    /// Number of most recent turns included in the generation context.
    pub max_history: usize,
    /// Accumulated silence that ends the session with `SILENCE`.
    pub silence_limit: Duration,
    /// Number of negative replies that ends the session with `REJECTED`.
    pub max_negative: u32,
    /// Time since the first negative reply that ends the session with
    /// `REJECTED`.
    pub max_elapsed_negative: Duration,
    /// Extra attempts after a failed generation call.
    pub generation_retries: u32,
    pub reply_max_tokens: u32,
    pub farewell_max_tokens: u32,
    pub prompts: PromptSet,
}

impl NegotiationConfig {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            max_history: 40,
            silence_limit: Duration::from_secs(10),
            max_negative: 5,
            max_elapsed_negative: Duration::from_secs(40),
            generation_retries: 1,
            reply_max_tokens: 60,
            farewell_max_tokens: 30,
            prompts: PromptSet::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────────────────

/// Where the protocol currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Greet,
    RobotTurn,
    AwaitHuman,
    Classify,
    Terminated,
}

/// Result of one [`NegotiationSession::interactive_turn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The robot spoke, listened, and the conversation goes on.
    Continue,
    /// No more turns; the session ended with this tag.
    Finished(FinalTag),
}

/// Mutable bookkeeping for one conversation.
///
/// `final_tag` is set exactly once; after that nothing in the state changes.
#[derive(Debug, Clone, PartialEq)]
pub struct NegotiationState {
    history: Transcript,
    negative_count: u32,
    silence_elapsed: Duration,
    negative_since: Option<Instant>,
    final_tag: Option<FinalTag>,
    greeted: bool,
    phase: SessionPhase,
}

impl Default for NegotiationState {
    fn default() -> Self {
        Self::new()
    }
}

impl NegotiationState {
    pub fn new() -> Self {
        Self {
            history: Transcript::new(),
            negative_count: 0,
            silence_elapsed: Duration::ZERO,
            negative_since: None,
            final_tag: None,
            greeted: false,
            phase: SessionPhase::Greet,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.history
    }

    pub fn negative_count(&self) -> u32 {
        self.negative_count
    }

    pub fn silence_elapsed(&self) -> Duration {
        self.silence_elapsed
    }

    pub fn negative_since(&self) -> Option<Instant> {
        self.negative_since
    }

    pub fn final_tag(&self) -> Option<FinalTag> {
        self.final_tag
    }

    pub fn greeted(&self) -> bool {
        self.greeted
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.final_tag.is_some()
    }

    /// The full transcript as `role: text` lines, regardless of the
    /// generation window. See [`Transcript::parse_lines`].
    pub fn dump(&self) -> String {
        self.history.to_lines()
    }

    /// Consume the state, keeping only the transcript.
    pub fn into_transcript(self) -> Transcript {
        self.history
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// The negotiation protocol and its collaborators.
pub struct NegotiationSession {
    config: NegotiationConfig,
    generator: Arc<dyn Generator>,
    classifier: Arc<dyn Classifier>,
    speech: Arc<dyn Speech>,
    clock: Arc<dyn Clock>,
}

impl NegotiationSession {
    pub fn new(
        config: NegotiationConfig,
        generator: Arc<dyn Generator>,
        classifier: Arc<dyn Classifier>,
        speech: Arc<dyn Speech>,
    ) -> Self {
        Self {
            config,
            generator,
            classifier,
            speech,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for the negative-reply time window.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.config
    }

    /// Fresh state for a new conversation.
    pub fn start(&self) -> NegotiationState {
        NegotiationState::new()
    }

    /// Run one robot-speaks / human-answers exchange.
    ///
    /// Returns [`TurnOutcome::Finished`] once the session has a final tag;
    /// calling again after that returns the same tag and changes nothing.
    pub async fn interactive_turn(
        &self,
        state: &mut NegotiationState,
        listen_timeout: Duration,
    ) -> TurnOutcome {
        if let Some(tag) = state.final_tag {
            return TurnOutcome::Finished(tag);
        }

        if !state.greeted {
            let greeting = self.config.prompts.greeting_for(&self.config.goal);
            self.say(state, greeting);
            state.greeted = true;
        }

        // ── Robot turn ────────────────────────────────────────────────────
        state.phase = SessionPhase::RobotTurn;
        let context = self.reply_context(state);
        let reply = match self
            .generate_with_retry(&context, self.config.reply_max_tokens)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "robot turn could not be generated; abandoning negotiation");
                self.say(state, SERVICE_FAILURE_APOLOGY.to_string());
                return self.finish(state, FinalTag::ServiceFailure);
            }
        };
        self.say(state, reply.clone());

        if let Some(marker) = Marker::find_in(&reply) {
            debug!(marker = marker.token(), "robot utterance carries a termination marker");
            return self.finish(state, FinalTag::from_marker(marker));
        }

        // ── Await human ───────────────────────────────────────────────────
        state.phase = SessionPhase::AwaitHuman;
        let Some(human) = self.speech.listen(listen_timeout).await else {
            state.silence_elapsed += listen_timeout;
            info!(silence = ?state.silence_elapsed, limit = ?self.config.silence_limit, "no reply");
            if state.silence_elapsed >= self.config.silence_limit {
                return self.farewell(state, FinalTag::Silence).await;
            }
            if self.negative_window_expired(state) {
                return self.farewell(state, FinalTag::Rejected).await;
            }
            state.phase = SessionPhase::RobotTurn;
            return TurnOutcome::Continue;
        };

        state.history.push(Turn::human(human.clone()));
        state.silence_elapsed = Duration::ZERO;

        // ── Classify ──────────────────────────────────────────────────────
        state.phase = SessionPhase::Classify;
        let sentiment = match self.classifier.classify(&human).await {
            Ok(sentiment) => sentiment,
            Err(e) => {
                warn!(error = %e, "classification failed; treating reply as neutral");
                Sentiment::Neutral
            }
        };
        info!(?sentiment, reply = %human, "human reply classified");

        match sentiment {
            Sentiment::Positive => return self.farewell(state, FinalTag::Clear).await,
            Sentiment::Negative => {
                state.negative_count += 1;
                if state.negative_since.is_none() {
                    state.negative_since = Some(self.clock.now());
                }
                if state.negative_count >= self.config.max_negative
                    || self.negative_window_expired(state)
                {
                    return self.farewell(state, FinalTag::Rejected).await;
                }
            }
            Sentiment::Neutral => {}
        }

        state.phase = SessionPhase::RobotTurn;
        TurnOutcome::Continue
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// System prompt, worked examples, then the most recent turns.
    fn reply_context(&self, state: &NegotiationState) -> Vec<ChatMessage> {
        let prompts = &self.config.prompts;
        let mut messages = vec![ChatMessage::system(prompts.system_prompt(&self.config.goal))];
        messages.extend(prompts.example_messages());
        messages.extend(
            state
                .history
                .recent(self.config.max_history)
                .iter()
                .map(|t| match t.role {
                    Role::Robot => ChatMessage::assistant(t.text.clone()),
                    Role::Human => ChatMessage::user(t.text.clone()),
                }),
        );
        messages
    }

    async fn generate_with_retry(
        &self,
        context: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let attempts = self.config.generation_retries + 1;
        let mut attempt = 1;
        loop {
            match self.generator.generate(context, max_tokens).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < attempts => {
                    warn!(error = %e, attempt, "generation failed; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Say goodbye with `tag`'s marker and end the session.
    async fn farewell(&self, state: &mut NegotiationState, tag: FinalTag) -> TurnOutcome {
        let Some(marker) = tag.marker() else {
            return self.finish(state, tag);
        };
        let instruction = self.config.prompts.farewell_instruction(marker);
        let context = [ChatMessage::system(instruction)];
        let mut text = match self
            .generate_with_retry(&context, self.config.farewell_max_tokens)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "farewell generation failed; using canned farewell");
                CANNED_FAREWELL.to_string()
            }
        };
        if !marker.is_in(&text) {
            text.push(' ');
            text.push_str(marker.token());
        }
        self.say(state, text);
        self.finish(state, tag)
    }

    fn finish(&self, state: &mut NegotiationState, tag: FinalTag) -> TurnOutcome {
        state.final_tag = Some(tag);
        state.phase = SessionPhase::Terminated;
        info!(
            %tag,
            turns = state.history.len(),
            negatives = state.negative_count,
            "negotiation finished"
        );
        TurnOutcome::Finished(tag)
    }

    fn say(&self, state: &mut NegotiationState, text: String) {
        self.speech.speak(&text);
        state.history.push(Turn::robot(text));
    }

    fn negative_window_expired(&self, state: &NegotiationState) -> bool {
        state.negative_since.is_some_and(|since| {
            self.clock.now().saturating_duration_since(since) >= self.config.max_elapsed_negative
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
