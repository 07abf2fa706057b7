//! `parley-runtime` – the agent's control and negotiation engine.
//!
//! # Modules
//!
//! - [`agent`] – [`Agent`][agent::Agent]: the per-tick orchestrator that
//!   wires perception, the subgoal stack, the supervisor, the planner and the
//!   negotiation session together. It is the only entry point the binary
//!   uses.
//! - [`subgoal`] – [`SubgoalStack`][subgoal::SubgoalStack]: LIFO mission
//!   decomposition whose root subgoal marks mission completion.
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: the
//!   `NAVIGATING / INTERACTING / TALKING / WAITING_REPLY / FINISHED` state
//!   machine.
//! - [`planner`] – [`Planner`][planner::Planner]: pure, rule-ordered
//!   observation-to-action mapping.
//! - [`negotiation`] – [`NegotiationSession`][negotiation::NegotiationSession]:
//!   the turn-based protocol that talks a blocking human out of the way and
//!   always ends on a marker-tagged farewell.
//! - [`perception`], [`language`], [`speech`] – collaborator traits and their
//!   production adapters (vision model, chat model, console).
//! - [`llm_driver`] – [`LlmDriver`][llm_driver::LlmDriver]: async
//!   OpenAI-compatible chat-completions client with a per-request timeout.
//! - [`clock`] – injectable monotonic clock.
//! - [`snapshot`] – [`SnapshotBus`][snapshot::SnapshotBus]: broadcast
//!   channel feeding display sinks.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: tracing
//!   subscriber with optional OTLP export.

pub mod agent;
pub mod clock;
pub mod language;
pub mod llm_driver;
pub mod negotiation;
pub mod perception;
pub mod planner;
pub mod snapshot;
pub mod speech;
pub mod subgoal;
pub mod supervisor;
pub mod telemetry;

pub use agent::{Agent, AgentConfig, AgentError, CompletedNegotiation, Negotiator, StepRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use language::{
    ClassificationError, Classifier, GenerationError, Generator, LlmClassifier, LlmGenerator,
    PromptExample, PromptSet,
};
pub use llm_driver::{ChatMessage, LlmDriver, LlmError};
pub use negotiation::{NegotiationConfig, NegotiationSession, NegotiationState, TurnOutcome};
pub use perception::{Perception, PerceptionError, VlmPerception};
pub use planner::Planner;
pub use snapshot::SnapshotBus;
pub use speech::{ConsoleSpeech, Speech};
pub use subgoal::{EmptyStackError, SubgoalStack};
pub use supervisor::{Supervisor, TransitionError};
pub use telemetry::{TracerProviderGuard, init_tracing};
