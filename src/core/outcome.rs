//! Trial outcome classification from the executor's event log.

use crate::rig::{Event, EventLog};
use crate::settings::TrialType;
use serde::{Deserialize, Serialize};

/// How a single trial resolved.
///
/// `Omitted` is a valid outcome, not an error: the subject never produced a
/// qualifying response before the trial ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    Incorrect,
    Omitted,
}

impl Outcome {
    pub fn is_correct(self) -> bool {
        self == Outcome::Correct
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Correct => "correct",
            Outcome::Incorrect => "incorrect",
            Outcome::Omitted => "omitted",
        }
    }
}

/// First occurrence of any target event in the log, in log order.
///
/// A linear first-match scan: the first log entry that appears in `targets`
/// wins, and later matches are never inspected. `None` is the omission
/// sentinel.
pub fn first_occurrence(log: &EventLog, targets: &[Event]) -> Option<Event> {
    log.iter()
        .map(|timed| timed.event)
        .find(|event| targets.contains(event))
}

/// Classifies a first response against the side implied by the trial type.
pub fn classify(first_response: Option<Event>, trial_type: TrialType) -> Outcome {
    match first_response {
        Some(Event::PortIn(port)) if port == trial_type.side() => Outcome::Correct,
        Some(_) => Outcome::Incorrect,
        None => Outcome::Omitted,
    }
}
