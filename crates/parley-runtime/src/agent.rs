//! [`Agent`] – the control-tick orchestrator.
//!
//! Each call to [`Agent::step`]:
//!
//! 1. **Perceive** – ask the [`Perception`] collaborator for an
//!    [`Observation`] in the supervisor's current mode, aimed at the current
//!    subgoal.
//! 2. **Track** – update the [`SubgoalStack`] and pop what is done.
//! 3. **Supervise** – feed the observation to the [`Supervisor`]; mission
//!    completion wins over everything else and yields `STOP`.
//! 4. **Decide** – ask the [`Planner`] for an action.
//! 5. **Negotiate** – a talk action hands control to the
//!    [`NegotiationSession`] until it reaches a final tag, then navigation
//!    resumes. Snapshots are published as the conversation progresses, so
//!    display sinks see the interaction mode and the live transcript.
//!
//! A perception failure is not fatal: it is logged and surfaced as an
//! `ERROR` action and the next tick tries again. An empty subgoal stack or
//! an illegal supervisor transition is a logic defect and aborts the step
//! with an [`AgentError`].

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parley_hal::CameraFrame;
use parley_types::{
    Action, AgentSnapshot, AgentState, FinalTag, InteractionType, Mode, Observation, Transcript,
};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::negotiation::{NegotiationSession, TurnOutcome};
use crate::perception::Perception;
use crate::planner::{DEFAULT_FORWARD_STEP, Planner};
use crate::snapshot::SnapshotBus;
use crate::subgoal::{EmptyStackError, SubgoalStack};
use crate::supervisor::{Supervisor, TransitionError};

/// Turns of the latest negotiation included in a snapshot.
const SNAPSHOT_TRANSCRIPT_TURNS: usize = 6;

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Fatal mission errors. Both variants indicate a logic defect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error(transparent)]
    EmptyStack(#[from] EmptyStackError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The root subgoal.
    pub goal: String,
    /// Steps toward the goal, executed first to last.
    pub plan: Vec<String>,
    /// Bounded wait for each human reply during a negotiation.
    pub listen_timeout: Duration,
    /// Number of `(observation, action)` records kept.
    pub history_size: usize,
    pub forward_step: f32,
}

impl AgentConfig {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            plan: Vec::new(),
            listen_timeout: Duration::from_secs(5),
            history_size: 10,
            forward_step: DEFAULT_FORWARD_STEP,
        }
    }
}

/// Whether the agent can hold a conversation at all.
pub enum Negotiator {
    Present(NegotiationSession),
    Absent,
}

/// One tick's input and outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub observation: Observation,
    pub action: Action,
}

/// A finished conversation kept for the mission log.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedNegotiation {
    pub tag: FinalTag,
    pub transcript: Transcript,
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every piece of mission state; nothing else mutates it.
pub struct Agent {
    id: Uuid,
    config: AgentConfig,
    perception: Arc<dyn Perception>,
    negotiator: Negotiator,
    planner: Planner,
    subgoals: SubgoalStack,
    supervisor: Supervisor,
    memory: VecDeque<StepRecord>,
    negotiations: Vec<CompletedNegotiation>,
    latest_action: Option<Action>,
    snapshots: Option<SnapshotBus>,
}

impl Agent {
    pub fn new(config: AgentConfig, perception: Arc<dyn Perception>, negotiator: Negotiator) -> Self {
        let subgoals = SubgoalStack::for_mission(config.goal.clone(), config.plan.iter().cloned());
        if matches!(negotiator, Negotiator::Absent) {
            warn!("agent built without a negotiation capability; blocking humans will be ignored");
        }
        Self {
            id: Uuid::new_v4(),
            planner: Planner::new(config.forward_step),
            memory: VecDeque::with_capacity(config.history_size),
            config,
            perception,
            negotiator,
            subgoals,
            supervisor: Supervisor::new(),
            negotiations: Vec::new(),
            latest_action: None,
            snapshots: None,
        }
    }

    /// Publish an [`AgentSnapshot`] on `bus` after every step.
    pub fn with_snapshots(mut self, bus: SnapshotBus) -> Self {
        self.snapshots = Some(bus);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `true` once the mission goal has been reached.
    pub fn finished(&self) -> bool {
        self.supervisor.is_finished()
    }

    pub fn state(&self) -> AgentState {
        self.supervisor.state()
    }

    pub fn mode(&self) -> Mode {
        self.supervisor.mode()
    }

    pub fn subgoals(&self) -> &SubgoalStack {
        &self.subgoals
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Most recent records, oldest first.
    pub fn memory(&self) -> impl Iterator<Item = &StepRecord> {
        self.memory.iter()
    }

    pub fn negotiations(&self) -> &[CompletedNegotiation] {
        &self.negotiations
    }

    pub fn latest_action(&self) -> Option<&Action> {
        self.latest_action.as_ref()
    }

    /// Run one control tick against `frame`.
    ///
    /// # Errors
    ///
    /// [`AgentError`] on a broken mission invariant; the mission cannot
    /// continue after one.
    pub async fn step(&mut self, frame: &CameraFrame) -> Result<Action, AgentError> {
        if self.supervisor.is_finished() {
            return Ok(Action::stop());
        }

        let mode = self.supervisor.mode();
        let target = self.subgoals.current()?.description.clone();
        let observation = match self.perception.perceive(frame, mode, &target).await {
            Ok(obs) => obs,
            Err(e) => {
                warn!(error = %e, frame = frame.sequence, "perception failed; skipping tick");
                let action = Action::error(e.to_string());
                self.finish_step(None, action.clone());
                return Ok(action);
            }
        };

        self.subgoals.update_from_observation(&observation)?;
        self.subgoals.pop_finished();
        let state = self
            .supervisor
            .observe(&observation, self.subgoals.root_achieved())?;

        let action = if state == AgentState::Finished {
            info!(goal = %self.config.goal, "mission accomplished");
            Action::stop()
        } else {
            let planned = self.planner.decide(&observation);
            if self.supervisor.on_action(&planned)? == AgentState::Talking {
                self.negotiate(planned).await?
            } else {
                planned
            }
        };

        self.finish_step(Some(observation), action.clone());
        Ok(action)
    }

    /// The current view of the agent for display sinks.
    pub fn snapshot(&self) -> AgentSnapshot {
        self.snapshot_with(self.negotiations.last().map(|n| &n.transcript))
    }

    // -------------------------------------------------------------------------
    // Private helpers
    // -------------------------------------------------------------------------

    /// Drive a negotiation to its final tag and return the resulting
    /// interaction action.
    async fn negotiate(&mut self, talk: Action) -> Result<Action, AgentError> {
        let session = match &self.negotiator {
            Negotiator::Present(session) => session,
            Negotiator::Absent => {
                warn!("cannot negotiate without a conversation capability");
                self.supervisor.conclude_negotiation(None)?;
                return Ok(talk);
            }
        };

        self.latest_action = Some(talk.clone());
        let mut state = session.start();
        self.publish_live(state.transcript());
        let tag = loop {
            match session
                .interactive_turn(&mut state, self.config.listen_timeout)
                .await
            {
                TurnOutcome::Continue => {
                    self.supervisor.awaiting_reply()?;
                    self.supervisor.reply_received()?;
                    self.publish_live(state.transcript());
                }
                TurnOutcome::Finished(tag) => break tag,
            }
        };
        self.supervisor.conclude_negotiation(Some(tag))?;

        let transcript = state.into_transcript();
        let target = match talk {
            Action::Interaction { target, .. } => target,
            _ => String::new(),
        };
        let action = Action::Interaction {
            interaction_type: InteractionType::Talk,
            target,
            utterance: transcript.last_robot_turn().map(|t| t.text.clone()),
            outcome: Some(tag),
        };
        self.negotiations.push(CompletedNegotiation { tag, transcript });
        Ok(action)
    }

    fn snapshot_with(&self, transcript: Option<&Transcript>) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id,
            timestamp: Utc::now(),
            mode: self.supervisor.mode(),
            state: self.supervisor.state(),
            latest_action: self.latest_action.clone(),
            recent_transcript: transcript
                .map(|t| t.recent(SNAPSHOT_TRANSCRIPT_TURNS).to_vec())
                .unwrap_or_default(),
            subgoals: self.subgoals.as_slice().to_vec(),
        }
    }

    /// Mid-negotiation snapshot carrying the conversation so far.
    fn publish_live(&self, transcript: &Transcript) {
        if let Some(bus) = &self.snapshots {
            bus.publish(self.snapshot_with(Some(transcript)));
        }
    }

    fn finish_step(&mut self, observation: Option<Observation>, action: Action) {
        if let Some(observation) = observation {
            if self.memory.len() == self.config.history_size {
                self.memory.pop_front();
            }
            if self.config.history_size > 0 {
                self.memory.push_back(StepRecord {
                    observation,
                    action: action.clone(),
                });
            }
        }
        info!(%action, state = %self.supervisor.state(), "tick complete");
        self.latest_action = Some(action);
        if let Some(bus) = &self.snapshots {
            bus.publish(self.snapshot());
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
