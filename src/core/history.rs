//! Per-trial and per-session records, and the subject's session history.

use crate::outcome::Outcome;
use crate::settings::TrialType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A free-form measurement attached to a trial by a task's `after_trial`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrialValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

/// Immutable result of one trial. Appended to the session, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    #[serde(default)]
    pub trial_type: Option<TrialType>,
    pub outcome: Outcome,
    /// Water actually delivered this trial, milliliters. Always recorded,
    /// zero included.
    pub water_ml: f32,
    #[serde(default)]
    pub values: HashMap<String, TrialValue>,
}

impl TrialRecord {
    pub fn new(outcome: Outcome, water_ml: f32) -> Self {
        Self {
            trial_type: None,
            outcome,
            water_ml,
            values: HashMap::new(),
        }
    }

    pub fn with_trial_type(mut self, trial_type: TrialType) -> Self {
        self.trial_type = Some(trial_type);
        self
    }

    pub fn register_value(&mut self, name: &str, value: TrialValue) {
        self.values.insert(name.to_string(), value);
    }
}

/// One continuous run of one task for one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub task: String,
    /// Wall-clock start, milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    pub trials: Vec<TrialRecord>,
}

impl SessionRecord {
    pub fn new(task: &str, started_at_ms: u64) -> Self {
        Self {
            task: task.to_string(),
            started_at_ms,
            trials: Vec::new(),
        }
    }

    pub fn push(&mut self, trial: TrialRecord) {
        self.trials.push(trial);
    }

    pub fn trial_count(&self) -> u32 {
        self.trials.len() as u32
    }

    /// Mean correctness over all trials. Omitted trials count against
    /// accuracy; an empty session scores 0.0.
    pub fn accuracy(&self) -> f32 {
        if self.trials.is_empty() {
            return 0.0;
        }
        let correct = self
            .trials
            .iter()
            .filter(|t| t.outcome.is_correct())
            .count();
        correct as f32 / self.trials.len() as f32
    }

    /// Total water delivered this session, milliliters.
    pub fn water_ml(&self) -> f32 {
        self.trials.iter().map(|t| t.water_ml).sum()
    }
}

/// Query surface the training controller reads.
///
/// The chronological ordering of `sessions_for` is part of the contract, not
/// an incidental property of how records happen to be stored.
pub trait SessionHistory {
    /// Append-only.
    fn push(&mut self, session: SessionRecord);

    /// All sessions of `task`, oldest first by `started_at_ms`.
    fn sessions_for(&self, task: &str) -> Vec<&SessionRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory, serde-persistable history for one subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryHistory {
    subject: String,
    sessions: Vec<SessionRecord>,
}

impl MemoryHistory {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            sessions: Vec::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn sessions(&self) -> &[SessionRecord] {
        &self.sessions
    }
}

impl SessionHistory for MemoryHistory {
    fn push(&mut self, session: SessionRecord) {
        self.sessions.push(session);
    }

    fn sessions_for(&self, task: &str) -> Vec<&SessionRecord> {
        let mut matched: Vec<&SessionRecord> = self
            .sessions
            .iter()
            .filter(|s| s.task == task)
            .collect();
        // Sort explicitly; append order is not trusted to be chronological.
        matched.sort_by_key(|s| s.started_at_ms);
        matched
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(task: &str, at: u64, correct: u32, total: u32) -> SessionRecord {
        let mut s = SessionRecord::new(task, at);
        for i in 0..total {
            let outcome = if i < correct {
                Outcome::Correct
            } else {
                Outcome::Incorrect
            };
            s.push(TrialRecord::new(outcome, 0.0));
        }
        s
    }

    #[test]
    fn accuracy_counts_omissions_against() {
        let mut s = SessionRecord::new("follow_the_light", 0);
        s.push(TrialRecord::new(Outcome::Correct, 0.07));
        s.push(TrialRecord::new(Outcome::Omitted, 0.0));
        assert!((s.accuracy() - 0.5).abs() < 1e-6);
        assert!((s.water_ml() - 0.07).abs() < 1e-6);
    }

    #[test]
    fn sessions_for_is_chronological_even_when_appended_out_of_order() {
        let mut h = MemoryHistory::new("m01");
        h.push(session("habituation", 2000, 10, 10));
        h.push(session("habituation", 1000, 5, 10));
        h.push(session("follow_the_light", 1500, 8, 10));

        let habituation = h.sessions_for("habituation");
        assert_eq!(habituation.len(), 2);
        assert_eq!(habituation[0].started_at_ms, 1000);
        assert_eq!(habituation[1].started_at_ms, 2000);
    }
}
