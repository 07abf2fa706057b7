//! [`Planner`] – rule-ordered mapping from an observation to an action.
//!
//! Rules are tried in order and the first one that fires wins. When none
//! fires the planner steps forward by a fixed distance.
//!
//! | # | Condition | Action |
//! |---|---|---|
//! | 1 | an obstacle is a human-blocking category | `INTERACTION { TALK, target = category }` |
//! | – | otherwise | `NAVIGATION { FORWARD, angle 0, distance = step }` |
//!
//! # Example
//!
//! ```rust
//! use parley_runtime::planner::Planner;
//! use parley_types::{Action, NavigationDirection, Observation};
//!
//! let planner = Planner::default();
//! let action = planner.decide(&Observation::default());
//! assert!(matches!(action, Action::Navigation { direction: NavigationDirection::Forward, .. }));
//! ```

use parley_types::{Action, InteractionType, NavigationDirection, Observation};

/// Default forward step in metres.
pub const DEFAULT_FORWARD_STEP: f32 = 0.5;

type Rule = fn(&Planner, &Observation) -> Option<Action>;

/// Priority order; insert new rules where they belong.
const RULES: &[Rule] = &[talk_to_blocking_human];

/// Stateless, deterministic planner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Planner {
    forward_step: f32,
}

impl Default for Planner {
    fn default() -> Self {
        Self::new(DEFAULT_FORWARD_STEP)
    }
}

impl Planner {
    pub fn new(forward_step: f32) -> Self {
        Self { forward_step }
    }

    pub fn forward_step(&self) -> f32 {
        self.forward_step
    }

    pub fn decide(&self, observation: &Observation) -> Action {
        RULES
            .iter()
            .find_map(|rule| rule(self, observation))
            .unwrap_or(Action::Navigation {
                direction: NavigationDirection::Forward,
                angle: 0.0,
                distance: self.forward_step,
            })
    }
}

fn talk_to_blocking_human(_: &Planner, observation: &Observation) -> Option<Action> {
    observation
        .blocking_human()
        .map(|category| Action::Interaction {
            interaction_type: InteractionType::Talk,
            target: category.to_string(),
            utterance: None,
            outcome: None,
        })
}
