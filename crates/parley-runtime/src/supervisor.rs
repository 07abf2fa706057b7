//! [`Supervisor`] – the mode-selecting finite-state machine.
//!
//! ```text
//!              human blocking              talk action
//!  NAVIGATING ───────────────▶ INTERACTING ───────────▶ TALKING ◀──┐
//!     │  ▲                                                │      │
//!     │  └──────────────── final tag ─────────────────────┤      │ reply / timeout
//!     │                                                   ▼      │
//!     │ root achieved                              WAITING_REPLY ─┘
//!     ▼
//!  FINISHED
//! ```
//!
//! Every state change goes through [`AgentState::can_transition_to`]; an
//! edge outside the diagram is reported as a [`TransitionError`] and the state
//! is left untouched.

use parley_types::{Action, AgentState, FinalTag, Mode, Observation};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("illegal supervisor transition {from} -> {to}")]
pub struct TransitionError {
    pub from: AgentState,
    pub to: AgentState,
}

#[derive(Debug, Clone)]
pub struct Supervisor {
    state: AgentState,
    /// Every transition taken, oldest first.
    log: Vec<(AgentState, AgentState)>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            state: AgentState::Navigating,
            log: Vec::new(),
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.state.mode()
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn transitions(&self) -> &[(AgentState, AgentState)] {
        &self.log
    }

    /// Feed the latest observation. Only `NAVIGATING` reacts to it: mission
    /// completion wins over a blocking human.
    pub fn observe(
        &mut self,
        obs: &Observation,
        root_achieved: bool,
    ) -> Result<AgentState, TransitionError> {
        if self.state == AgentState::Navigating {
            if root_achieved {
                self.transition(AgentState::Finished)?;
            } else if let Some(category) = obs.blocking_human() {
                debug!(category, "path blocked by a human");
                self.transition(AgentState::Interacting)?;
            }
        }
        Ok(self.state)
    }

    /// Feed the action chosen by the planner.
    pub fn on_action(&mut self, action: &Action) -> Result<AgentState, TransitionError> {
        if self.state == AgentState::Interacting && action.is_talk() {
            self.transition(AgentState::Talking)?;
        }
        Ok(self.state)
    }

    /// The robot finished speaking and is now listening.
    pub fn awaiting_reply(&mut self) -> Result<(), TransitionError> {
        self.transition(AgentState::WaitingReply)
    }

    /// A reply arrived (or the listen window closed); back to talking.
    pub fn reply_received(&mut self) -> Result<(), TransitionError> {
        self.transition(AgentState::Talking)
    }

    /// The negotiation ended; resume navigation. `None` means no negotiation
    /// could be held.
    pub fn conclude_negotiation(&mut self, tag: Option<FinalTag>) -> Result<(), TransitionError> {
        match tag {
            Some(tag) => info!(%tag, "negotiation concluded"),
            None => info!("negotiation skipped"),
        }
        self.transition(AgentState::Navigating)
    }

    fn transition(&mut self, to: AgentState) -> Result<(), TransitionError> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }
        info!(%from, %to, "supervisor transition");
        self.state = to;
        self.log.push((from, to));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::{InteractionType, NavigationDirection};

    fn obs(obstacles: &[&str]) -> Observation {
        Observation {
            obstacles: obstacles.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn talk() -> Action {
        Action::Interaction {
            interaction_type: InteractionType::Talk,
            target: "person".into(),
            utterance: None,
            outcome: None,
        }
    }

    fn forward() -> Action {
        Action::Navigation {
            direction: NavigationDirection::Forward,
            angle: 0.0,
            distance: 0.5,
        }
    }

    #[test]
    fn starts_navigating() {
        let sup = Supervisor::new();
        assert_eq!(sup.state(), AgentState::Navigating);
        assert_eq!(sup.mode(), Mode::Navigation);
        assert!(!sup.is_finished());
    }

    #[test]
    fn full_negotiation_cycle() {
        let mut sup = Supervisor::new();
        assert_eq!(sup.observe(&obs(&["person"]), false).unwrap(), AgentState::Interacting);
        assert_eq!(sup.mode(), Mode::Interaction);
        assert_eq!(sup.on_action(&talk()).unwrap(), AgentState::Talking);
        sup.awaiting_reply().unwrap();
        assert_eq!(sup.state(), AgentState::WaitingReply);
        assert_eq!(sup.mode(), Mode::Interaction);
        sup.reply_received().unwrap();
        sup.conclude_negotiation(Some(FinalTag::Clear)).unwrap();
        assert_eq!(sup.state(), AgentState::Navigating);
        assert_eq!(sup.transitions().len(), 5);
    }

    #[test]
    fn root_achieved_finishes_even_with_person_in_view() {
        let mut sup = Supervisor::new();
        assert_eq!(sup.observe(&obs(&["person"]), true).unwrap(), AgentState::Finished);
        assert!(sup.is_finished());
    }

    #[test]
    fn finished_is_terminal() {
        let mut sup = Supervisor::new();
        sup.observe(&obs(&[]), true).unwrap();
        assert_eq!(sup.observe(&obs(&["person"]), false).unwrap(), AgentState::Finished);
        assert_eq!(sup.on_action(&talk()).unwrap(), AgentState::Finished);
        assert_eq!(
            sup.conclude_negotiation(None),
            Err(TransitionError {
                from: AgentState::Finished,
                to: AgentState::Navigating
            })
        );
        assert!(sup.awaiting_reply().is_err());
        assert_eq!(sup.state(), AgentState::Finished);
    }

    #[test]
    fn non_talk_action_keeps_interacting() {
        let mut sup = Supervisor::new();
        sup.observe(&obs(&["person"]), false).unwrap();
        assert_eq!(sup.on_action(&forward()).unwrap(), AgentState::Interacting);
    }

    #[test]
    fn illegal_edges_are_rejected_without_state_change() {
        let mut sup = Supervisor::new();
        assert!(sup.awaiting_reply().is_err());
        assert!(sup.reply_received().is_err());
        assert_eq!(sup.state(), AgentState::Navigating);
        assert!(sup.transitions().is_empty());
    }

    #[test]
    fn interaction_states_ignore_observations() {
        let mut sup = Supervisor::new();
        sup.observe(&obs(&["person"]), false).unwrap();
        sup.on_action(&talk()).unwrap();
        assert_eq!(sup.observe(&obs(&[]), true).unwrap(), AgentState::Talking);
    }

    #[test]
    fn every_logged_transition_is_a_legal_edge() {
        // Drive the machine with a deterministic pseudo-random input stream.
        let mut sup = Supervisor::new();
        let mut seed: u32 = 0x9E37_79B9;
        for _ in 0..2_000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let _ = match seed % 6 {
                0 => sup.observe(&obs(&["person"]), false).map(|_| ()),
                1 => sup.observe(&obs(&["chair"]), seed % 97 == 0).map(|_| ()),
                2 => sup.on_action(&talk()).map(|_| ()),
                3 => sup.awaiting_reply(),
                4 => sup.reply_received(),
                _ => sup.conclude_negotiation(Some(FinalTag::Rejected)),
            };
        }
        let mut previous = AgentState::Navigating;
        for (from, to) in sup.transitions() {
            assert_eq!(*from, previous, "transition log must be contiguous");
            assert!(from.can_transition_to(*to), "{from} -> {to} is not an edge");
            previous = *to;
        }
        assert_eq!(previous, sup.state());
    }
}
