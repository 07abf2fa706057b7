use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Obstacle categories that mean a person is standing in the robot's way.
pub const HUMAN_BLOCKING_CATEGORIES: &[&str] = &["person", "people", "human", "pedestrian"];

// ─────────────────────────────────────────────────────────────────────────────
// Operating state
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse external view of the supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Navigation,
    Interaction,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Navigation => write!(f, "navigation"),
            Mode::Interaction => write!(f, "interaction"),
        }
    }
}

/// Operating state held by the mode supervisor. `Finished` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Navigating,
    Interacting,
    Talking,
    WaitingReply,
    Finished,
}

impl AgentState {
    /// Map the state onto its external [`Mode`]. Pure.
    pub fn mode(self) -> Mode {
        match self {
            AgentState::Interacting | AgentState::Talking | AgentState::WaitingReply => {
                Mode::Interaction
            }
            AgentState::Navigating | AgentState::Finished => Mode::Navigation,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == AgentState::Finished
    }

    /// `true` when `self -> next` is one of the supervisor's edges.
    pub fn can_transition_to(self, next: AgentState) -> bool {
        use AgentState::*;
        matches!(
            (self, next),
            (Navigating, Interacting)
                | (Navigating, Finished)
                | (Interacting, Talking)
                | (Talking, WaitingReply)
                | (WaitingReply, Talking)
                | (Talking, Navigating)
                | (WaitingReply, Navigating)
        )
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentState::Navigating => "NAVIGATING",
            AgentState::Interacting => "INTERACTING",
            AgentState::Talking => "TALKING",
            AgentState::WaitingReply => "WAITING_REPLY",
            AgentState::Finished => "FINISHED",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Mission
// ─────────────────────────────────────────────────────────────────────────────

/// One decomposed step of the mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgoal {
    pub description: String,
    pub achieved: bool,
}

impl Subgoal {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            achieved: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Perception
// ─────────────────────────────────────────────────────────────────────────────

/// Scene status reported by the perception collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObservationStatus {
    #[default]
    Ok,
    Blocked,
    #[serde(other)]
    Unknown,
}

/// Structured result of one perception call. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    #[serde(default)]
    pub status: ObservationStatus,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub obstacles: BTreeSet<String>,
    #[serde(default)]
    pub goal_observed: bool,
    /// Raw hints from the model, in the order they were produced.
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

impl Observation {
    /// The first obstacle that belongs to a human-blocking category, if any.
    pub fn blocking_human(&self) -> Option<&str> {
        self.obstacles
            .iter()
            .map(String::as_str)
            .find(|o| is_human_blocking(o))
    }
}

/// Case-insensitive membership test against [`HUMAN_BLOCKING_CATEGORIES`].
pub fn is_human_blocking(category: &str) -> bool {
    let c = category.trim();
    HUMAN_BLOCKING_CATEGORIES
        .iter()
        .any(|h| h.eq_ignore_ascii_case(c))
}

// ─────────────────────────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationDirection {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionType {
    Talk,
    Wait,
}

/// Discriminant of an [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Navigation,
    Interaction,
    Error,
}

/// What the agent asks the robot to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Navigation {
        direction: NavigationDirection,
        /// Heading change in degrees.
        angle: f32,
        /// Travel distance in metres.
        distance: f32,
    },
    Interaction {
        interaction_type: InteractionType,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        utterance: Option<String>,
        /// How the negotiation ended, once it has.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<FinalTag>,
    },
    /// Diagnostic pseudo-action emitted when a tick could not complete.
    Error { message: String },
}

impl Action {
    pub fn stop() -> Self {
        Action::Navigation {
            direction: NavigationDirection::Stop,
            angle: 0.0,
            distance: 0.0,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Action::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Navigation { .. } => ActionKind::Navigation,
            Action::Interaction { .. } => ActionKind::Interaction,
            Action::Error { .. } => ActionKind::Error,
        }
    }

    /// `true` for an interaction whose type is [`InteractionType::Talk`].
    pub fn is_talk(&self) -> bool {
        matches!(
            self,
            Action::Interaction {
                interaction_type: InteractionType::Talk,
                ..
            }
        )
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Navigation {
                direction,
                angle,
                distance,
            } => write!(
                f,
                "NAVIGATION: {direction:?} angle={angle:.1} distance={distance:.2}"
            ),
            Action::Interaction {
                interaction_type,
                target,
                outcome,
                ..
            } => {
                write!(f, "INTERACTION: {interaction_type:?} -> {target}")?;
                if let Some(tag) = outcome {
                    write!(f, " [{tag}]")?;
                }
                Ok(())
            }
            Action::Error { message } => write!(f, "ERROR: {message}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Negotiation vocabulary
// ─────────────────────────────────────────────────────────────────────────────

/// Termination markers a robot utterance may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Marker {
    ClearPath,
    Rejected,
    NoResponse,
}

impl Marker {
    pub const ALL: [Marker; 3] = [Marker::ClearPath, Marker::Rejected, Marker::NoResponse];

    /// The literal token embedded in utterances.
    pub fn token(self) -> &'static str {
        match self {
            Marker::ClearPath => "#CLEAR_PATH",
            Marker::Rejected => "#REJECTED",
            Marker::NoResponse => "#NO_RESPONSE",
        }
    }

    /// Find the first marker (by position) embedded in `text`, ignoring case.
    pub fn find_in(text: &str) -> Option<Marker> {
        let upper = text.to_ascii_uppercase();
        Marker::ALL
            .iter()
            .filter_map(|m| upper.find(m.token()).map(|pos| (pos, *m)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, m)| m)
    }

    pub fn is_in(self, text: &str) -> bool {
        text.to_ascii_uppercase().contains(self.token())
    }
}

/// Terminal outcome of a negotiation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalTag {
    Clear,
    Rejected,
    Silence,
    /// The language services failed; distinct from silence and rejection.
    ServiceFailure,
}

impl FinalTag {
    pub fn marker(self) -> Option<Marker> {
        match self {
            FinalTag::Clear => Some(Marker::ClearPath),
            FinalTag::Rejected => Some(Marker::Rejected),
            FinalTag::Silence => Some(Marker::NoResponse),
            FinalTag::ServiceFailure => None,
        }
    }

    pub fn from_marker(marker: Marker) -> Self {
        match marker {
            Marker::ClearPath => FinalTag::Clear,
            Marker::Rejected => FinalTag::Rejected,
            Marker::NoResponse => FinalTag::Silence,
        }
    }
}

impl fmt::Display for FinalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinalTag::Clear => "CLEAR",
            FinalTag::Rejected => "REJECTED",
            FinalTag::Silence => "SILENCE",
            FinalTag::ServiceFailure => "SERVICE_FAILURE",
        };
        f.write_str(s)
    }
}

/// How a human reply was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Parse a classifier reply by prefix; anything unrecognised is neutral.
    pub fn parse(raw: &str) -> Self {
        let s = raw.trim().to_ascii_lowercase();
        if s.starts_with("pos") {
            Sentiment::Positive
        } else if s.starts_with("neg") {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transcript
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Robot,
    Human,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Robot => "robot",
            Role::Human => "human",
        }
    }
}

/// One utterance in a negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn robot(text: impl Into<String>) -> Self {
        Self {
            role: Role::Robot,
            text: text.into(),
        }
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            text: text.into(),
        }
    }
}

/// Append-only, chronologically ordered list of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The last `n` turns (fewer if the transcript is shorter).
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(n);
        &self.turns[start..]
    }

    pub fn last_robot_turn(&self) -> Option<&Turn> {
        self.turns.iter().rev().find(|t| t.role == Role::Robot)
    }

    /// Serialize as one `role: "text"` line per turn.
    ///
    /// The text is written as a JSON string literal, so line breaks and
    /// quotes inside it keep each turn on a single line.
    pub fn to_lines(&self) -> String {
        self.turns
            .iter()
            .map(|t| {
                // Serializing a `&str` cannot fail.
                let text = serde_json::to_string(&t.text).unwrap_or_default();
                format!("{}: {text}", t.role.as_str())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Inverse of [`Transcript::to_lines`].
    pub fn parse_lines(raw: &str) -> Result<Self, ParleyError> {
        let mut transcript = Transcript::new();
        if raw.is_empty() {
            return Ok(transcript);
        }
        for (idx, line) in raw.split('\n').enumerate() {
            let (role, text) = line.split_once(": ").ok_or_else(|| {
                ParleyError::Serialization(format!("line {}: missing role separator", idx + 1))
            })?;
            let role = match role {
                "robot" => Role::Robot,
                "human" => Role::Human,
                other => {
                    return Err(ParleyError::Serialization(format!(
                        "line {}: unknown role {other:?}",
                        idx + 1
                    )));
                }
            };
            let text: String = serde_json::from_str(text).map_err(|e| {
                ParleyError::Serialization(format!("line {}: bad turn text: {e}", idx + 1))
            })?;
            transcript.push(Turn { role, text });
        }
        Ok(transcript)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Telemetry snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only view of the agent handed to display sinks after every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub mode: Mode,
    pub state: AgentState,
    pub latest_action: Option<Action>,
    pub recent_transcript: Vec<Turn>,
    /// Bottom (root) first.
    pub subgoals: Vec<Subgoal>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Global error type spanning hardware, perception, language services and
/// mission invariants.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum ParleyError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Perception Error: {0}")]
    Perception(String),

    #[error("Language Service Error: {0}")]
    LanguageService(String),

    #[error("Mission invariant violated: {0}")]
    Invariant(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),

    #[error("Configuration Error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_states_map_to_interaction_mode() {
        assert_eq!(AgentState::Interacting.mode(), Mode::Interaction);
        assert_eq!(AgentState::Talking.mode(), Mode::Interaction);
        assert_eq!(AgentState::WaitingReply.mode(), Mode::Interaction);
        assert_eq!(AgentState::Navigating.mode(), Mode::Navigation);
        assert_eq!(AgentState::Finished.mode(), Mode::Navigation);
    }

    #[test]
    fn finished_has_no_outgoing_edges() {
        use AgentState::*;
        for next in [Navigating, Interacting, Talking, WaitingReply, Finished] {
            assert!(!Finished.can_transition_to(next));
        }
    }

    #[test]
    fn navigating_cannot_jump_to_talking() {
        assert!(!AgentState::Navigating.can_transition_to(AgentState::Talking));
        assert!(!AgentState::Interacting.can_transition_to(AgentState::Navigating));
    }

    #[test]
    fn blocking_human_is_case_insensitive() {
        let obs = Observation {
            obstacles: ["chair".to_string(), "Person".to_string()].into(),
            ..Default::default()
        };
        assert_eq!(obs.blocking_human(), Some("Person"));

        let clear = Observation {
            obstacles: ["chair".to_string()].into(),
            ..Default::default()
        };
        assert!(clear.blocking_human().is_none());
    }

    #[test]
    fn observation_accepts_unknown_status() {
        let obs: Observation =
            serde_json::from_str(r#"{"status":"FOGGY","description":"hall"}"#).unwrap();
        assert_eq!(obs.status, ObservationStatus::Unknown);
        assert!(obs.obstacles.is_empty());
        assert!(!obs.goal_observed);
    }

    #[test]
    fn action_serializes_with_kind_and_params() {
        let action = Action::Interaction {
            interaction_type: InteractionType::Talk,
            target: "person".into(),
            utterance: None,
            outcome: None,
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains(r#""kind":"INTERACTION""#));
        assert!(json.contains(r#""interaction_type":"TALK""#));
        assert!(!json.contains("utterance"));
        assert_eq!(action.kind(), ActionKind::Interaction);
        assert!(action.is_talk());
    }

    #[test]
    fn marker_detection_ignores_case_and_picks_earliest() {
        assert_eq!(Marker::find_in("ok thanks #clear_path"), Some(Marker::ClearPath));
        assert_eq!(
            Marker::find_in("#NO_RESPONSE then #REJECTED"),
            Some(Marker::NoResponse)
        );
        assert_eq!(Marker::find_in("no tag here"), None);
        assert!(Marker::Rejected.is_in("bye #Rejected"));
    }

    #[test]
    fn final_tag_marker_mapping() {
        for marker in Marker::ALL {
            assert_eq!(FinalTag::from_marker(marker).marker(), Some(marker));
        }
        assert_eq!(FinalTag::ServiceFailure.marker(), None);
    }

    #[test]
    fn sentiment_parses_by_prefix() {
        assert_eq!(Sentiment::parse(" Positive."), Sentiment::Positive);
        assert_eq!(Sentiment::parse("neg"), Sentiment::Negative);
        assert_eq!(Sentiment::parse("neutral"), Sentiment::Neutral);
        assert_eq!(Sentiment::parse("maybe"), Sentiment::Neutral);
        assert_eq!(Sentiment::parse(""), Sentiment::Neutral);
    }

    #[test]
    fn transcript_lines_recover_exact_turns() {
        let mut t = Transcript::new();
        t.push(Turn::robot("Hello: could you let me through?"));
        t.push(Turn::human("  no\nsorry \\ busy  "));
        t.push(Turn::robot("Thanks anyway #REJECTED"));
        t.push(Turn::human(""));
        t.push(Turn::robot("He said \"move\"\r\n\tthen left"));

        let dumped = t.to_lines();
        assert_eq!(dumped.lines().count(), 5);
        assert!(dumped.starts_with("robot: \"Hello: could you let me through?\""));
        let back = Transcript::parse_lines(&dumped).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn transcript_parse_rejects_unknown_role() {
        assert!(Transcript::parse_lines("robot: \"hi\"\nalien: \"hello\"").is_err());
        assert!(Transcript::parse_lines("no separator").is_err());
        assert!(Transcript::parse_lines("robot: \"unterminated").is_err());
        assert!(Transcript::parse_lines("").unwrap().is_empty());
    }

    #[test]
    fn transcript_recent_and_last_robot() {
        let mut t = Transcript::new();
        t.push(Turn::robot("a"));
        t.push(Turn::human("b"));
        t.push(Turn::human("c"));
        assert_eq!(t.recent(2).len(), 2);
        assert_eq!(t.recent(10).len(), 3);
        assert_eq!(t.last_robot_turn().map(|x| x.text.as_str()), Some("a"));
    }

    #[test]
    fn parley_error_display() {
        let err = ParleyError::HardwareFault {
            component: "front_rgb".to_string(),
            details: "unplugged".to_string(),
        };
        assert!(err.to_string().contains("front_rgb"));
    }
}
