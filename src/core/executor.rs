//! Executor seam: whatever runs a validated trial graph to its terminal
//! state and reports back the ordered event log.
//!
//! The hardware runtime lives behind this trait; the crate ships a software
//! stand-in in [`crate::sim`].

use crate::rig::EventLog;
use crate::state_machine::StateMachine;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    #[error("trial graph references unknown state {0:?}")]
    UnknownState(String),
    #[error("trial exceeded {0} state entries without reaching exit")]
    TrialOverrun(usize),
    #[error("rig fault: {0}")]
    Rig(String),
}

/// Runs one trial from its entry state to the terminal marker.
///
/// The only contract: on success, the returned log is ordered by timestamp
/// and covers everything the rig reported during the trial.
pub trait TrialExecutor {
    fn run(&mut self, trial: &StateMachine) -> Result<EventLog, ExecutorError>;
}
