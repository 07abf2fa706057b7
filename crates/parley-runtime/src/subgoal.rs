//! [`SubgoalStack`] – LIFO decomposition of the mission.
//!
//! The first subgoal pushed is the *root* (the mission goal itself). Steps
//! pushed on top of it are worked through first; the mission is complete once
//! the root is achieved.
//!
//! # Example
//!
//! ```rust
//! use parley_runtime::subgoal::SubgoalStack;
//! use parley_types::Observation;
//!
//! let mut stack = SubgoalStack::for_mission("enter office 12", ["reach the corridor"]);
//! assert_eq!(stack.current().unwrap().description, "reach the corridor");
//!
//! let obs = Observation {
//!     goal_observed: true,
//!     description: "a long corridor with doors".into(),
//!     ..Default::default()
//! };
//! assert!(stack.update_from_observation(&obs).unwrap());
//! stack.pop_finished();
//! assert_eq!(stack.current().unwrap().description, "enter office 12");
//! assert!(!stack.root_achieved());
//! ```

use parley_types::{Observation, Subgoal};
use thiserror::Error;
use tracing::{debug, info};

/// Raised when the stack is read while holding no subgoals.
///
/// During an active mission this is a logic defect, never an environmental
/// fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("subgoal stack is empty while the mission is active")]
pub struct EmptyStackError;

/// Words too common to identify a target.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "into", "onto", "from", "this", "that", "toward", "towards",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubgoalStack {
    /// Index 0 is the root; the last element is the current subgoal.
    stack: Vec<Subgoal>,
}

impl SubgoalStack {
    /// An empty stack. Push the root before starting a mission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Root `goal` with `plan` layered on top so that `plan[0]` is current.
    pub fn for_mission<I, S>(goal: impl Into<String>, plan: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut stack = Self::new();
        stack.push(Subgoal::new(goal));
        let steps: Vec<String> = plan.into_iter().map(Into::into).collect();
        for step in steps.into_iter().rev() {
            stack.push(Subgoal::new(step));
        }
        stack
    }

    pub fn push(&mut self, subgoal: Subgoal) {
        debug!(subgoal = %subgoal.description, depth = self.stack.len() + 1, "subgoal pushed");
        self.stack.push(subgoal);
    }

    /// The subgoal on top of the stack.
    pub fn current(&self) -> Result<&Subgoal, EmptyStackError> {
        self.stack.last().ok_or(EmptyStackError)
    }

    pub fn root(&self) -> Result<&Subgoal, EmptyStackError> {
        self.stack.first().ok_or(EmptyStackError)
    }

    /// Mark the current subgoal achieved when `obs` reports the goal in view
    /// and its description matches the subgoal's target.
    ///
    /// Returns whether the current subgoal was newly marked.
    pub fn update_from_observation(&mut self, obs: &Observation) -> Result<bool, EmptyStackError> {
        let current = self.stack.last_mut().ok_or(EmptyStackError)?;
        if current.achieved || !obs.goal_observed {
            return Ok(false);
        }
        if !goal_matches(&current.description, &obs.description) {
            debug!(
                subgoal = %current.description,
                seen = %obs.description,
                "goal observed but description does not match subgoal"
            );
            return Ok(false);
        }
        current.achieved = true;
        info!(subgoal = %current.description, "subgoal achieved");
        Ok(true)
    }

    /// Drop achieved subgoals from the top until the top is unachieved or
    /// only the root remains. Returns how many were removed.
    pub fn pop_finished(&mut self) -> usize {
        let mut popped = 0;
        while self.stack.len() > 1 && self.stack.last().is_some_and(|s| s.achieved) {
            if let Some(done) = self.stack.pop() {
                debug!(subgoal = %done.description, "subgoal popped");
            }
            popped += 1;
        }
        popped
    }

    /// `true` once the root subgoal is achieved, i.e. the mission is done.
    pub fn root_achieved(&self) -> bool {
        self.stack.first().is_some_and(|s| s.achieved)
    }

    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Root first, current last.
    pub fn as_slice(&self) -> &[Subgoal] {
        &self.stack
    }
}

/// `true` when `seen` shares at least one significant word with `target`.
///
/// Significant words are alphanumeric runs of three or more characters (or
/// any run of digits, so room numbers count) that are not stop words. A target
/// without significant words matches anything.
pub fn goal_matches(target: &str, seen: &str) -> bool {
    let wanted = significant_words(target);
    if wanted.is_empty() {
        return true;
    }
    let seen = significant_words(seen);
    wanted.iter().any(|w| seen.contains(w))
}

fn significant_words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() >= 3 || w.chars().all(|c| c.is_ascii_digit()))
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(description: &str) -> Observation {
        Observation {
            goal_observed: true,
            description: description.into(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_stack_current_fails() {
        let stack = SubgoalStack::new();
        assert_eq!(stack.current(), Err(EmptyStackError));
        let mut stack = stack;
        assert_eq!(stack.update_from_observation(&seen("x")), Err(EmptyStackError));
    }

    #[test]
    fn plan_order_puts_first_step_on_top() {
        let stack = SubgoalStack::for_mission("enter office 12", ["find lift", "reach floor 2"]);
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.current().unwrap().description, "find lift");
        assert_eq!(stack.root().unwrap().description, "enter office 12");
    }

    #[test]
    fn unobserved_goal_is_not_marked() {
        let mut stack = SubgoalStack::for_mission("enter office 12", Vec::<String>::new());
        let obs = Observation {
            goal_observed: false,
            description: "office 12 door".into(),
            ..Default::default()
        };
        assert!(!stack.update_from_observation(&obs).unwrap());
        assert!(!stack.root_achieved());
    }

    #[test]
    fn mismatched_description_is_not_marked() {
        let mut stack = SubgoalStack::for_mission("enter office 12", Vec::<String>::new());
        assert!(!stack.update_from_observation(&seen("a kitchen")).unwrap());
        assert!(stack.update_from_observation(&seen("door of OFFICE twelve")).unwrap());
        assert!(stack.root_achieved());
    }

    #[test]
    fn room_numbers_count_as_significant() {
        assert!(goal_matches("go to 12", "sign reading 12"));
        assert!(!goal_matches("go to 12", "sign reading 14"));
        assert!(goal_matches("go", "anything at all"));
        assert!(!goal_matches("the office", "the corridor"));
    }

    #[test]
    fn pop_finished_stops_at_unachieved() {
        let mut stack = SubgoalStack::for_mission("root", ["first", "second"]);
        assert!(stack.update_from_observation(&seen("first")).unwrap());
        assert_eq!(stack.pop_finished(), 1);
        assert_eq!(stack.current().unwrap().description, "second");
        assert_eq!(stack.pop_finished(), 0);
    }

    #[test]
    fn pop_finished_never_removes_root() {
        let mut stack = SubgoalStack::for_mission("root goal", Vec::<String>::new());
        assert!(stack.update_from_observation(&seen("root goal")).unwrap());
        assert_eq!(stack.pop_finished(), 0);
        assert_eq!(stack.len(), 1);
        assert!(stack.root_achieved());
    }

    #[test]
    fn pop_finished_is_idempotent() {
        let mut stack = SubgoalStack::for_mission("root", ["kitchen", "lobby"]);
        stack.update_from_observation(&seen("kitchen")).unwrap();
        stack.pop_finished();
        let once = stack.clone();
        stack.pop_finished();
        assert_eq!(stack, once);
    }

    #[test]
    fn already_achieved_top_is_not_remarked() {
        let mut stack = SubgoalStack::for_mission("root", Vec::<String>::new());
        assert!(stack.update_from_observation(&seen("root")).unwrap());
        assert!(!stack.update_from_observation(&seen("root")).unwrap());
    }
}
