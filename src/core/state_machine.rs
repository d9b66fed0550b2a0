//! Per-trial state machine construction and validation.
//!
//! A trial is a directed graph of named states. Each state asserts a set of
//! outputs on entry, then waits for the first qualifying event; an optional
//! timer arms the `Tup` timeout edge. The graph is built in entry order (the
//! first state added is where the trial starts) and must pass [`validate`]
//! before it is allowed anywhere near an executor.
//!
//! [`validate`]: StateMachine::validate

use crate::rig::{Event, Output};
use hashbrown::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;

/// Where a transition lands: another state in the same graph, or trial end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    State(String),
    Exit,
}

impl Target {
    pub fn state(name: &str) -> Self {
        Target::State(name.to_string())
    }
}

/// One node of the trial graph.
#[derive(Debug, Clone)]
pub struct StateSpec {
    pub name: String,
    /// `None` waits indefinitely for a qualifying event; `Some(d)` arms the
    /// `Tup` edge after `d`.
    pub timer: Option<Duration>,
    pub outputs: Vec<Output>,
    pub transitions: Vec<(Event, Target)>,
}

/// Structural defects caught before execution. These are programming errors
/// in a protocol definition, not runtime conditions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("trial graph has no states")]
    Empty,
    #[error("duplicate state name {name:?}")]
    DuplicateState { name: String },
    #[error("state {state:?} transitions to unknown state {target:?}")]
    UnresolvedTarget { state: String, target: String },
    #[error("state {state:?} has no outgoing transitions")]
    NoExit { state: String },
    #[error("state {state:?} has a Tup transition but no timer")]
    TimeoutWithoutTimer { state: String },
}

/// Append-order builder for a trial graph.
///
/// Mirrors how a trial is assembled on the hardware side: states are added
/// one by one, and the complete machine is validated as a unit.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    states: Vec<StateSpec>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(
        &mut self,
        name: &str,
        timer: Option<Duration>,
        transitions: Vec<(Event, Target)>,
        outputs: Vec<Output>,
    ) {
        self.states.push(StateSpec {
            name: name.to_string(),
            timer,
            outputs,
            transitions,
        });
    }

    /// The state the trial starts in: the first state added.
    pub fn entry(&self) -> Option<&StateSpec> {
        self.states.first()
    }

    pub fn state(&self, name: &str) -> Option<&StateSpec> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn states(&self) -> &[StateSpec] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Checks the whole graph. No machine that fails here may be executed.
    pub fn validate(&self) -> Result<(), BuildError> {
        if self.states.is_empty() {
            return Err(BuildError::Empty);
        }

        let mut names: HashMap<&str, usize> = HashMap::with_capacity(self.states.len());
        for s in &self.states {
            if names.insert(s.name.as_str(), 1).is_some() {
                return Err(BuildError::DuplicateState {
                    name: s.name.clone(),
                });
            }
        }

        for s in &self.states {
            if s.transitions.is_empty() {
                return Err(BuildError::NoExit {
                    state: s.name.clone(),
                });
            }
            for (event, target) in &s.transitions {
                if *event == Event::Tup && s.timer.is_none() {
                    return Err(BuildError::TimeoutWithoutTimer {
                        state: s.name.clone(),
                    });
                }
                if let Target::State(t) = target {
                    if !names.contains_key(t.as_str()) {
                        return Err(BuildError::UnresolvedTarget {
                            state: s.name.clone(),
                            target: t.clone(),
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Names of all states reachable from `from` by following transitions,
    /// excluding `from` itself unless a cycle returns to it.
    pub fn reachable_from(&self, from: &str) -> HashSet<String> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut stack: Vec<&str> = vec![from];
        while let Some(name) = stack.pop() {
            let Some(state) = self.state(name) else {
                continue;
            };
            for (_, target) in &state.transitions {
                if let Target::State(t) = target {
                    if seen.insert(t.clone()) {
                        stack.push(t.as_str());
                    }
                }
            }
        }
        seen
    }
}
