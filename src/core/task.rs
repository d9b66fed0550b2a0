//! Task capability interface.
//!
//! A task (protocol) is defined by four lifecycle operations and selected by
//! name at session start. `start` resolves everything that must exist before
//! any graph is built (calibration lookups, stage-dependent rewiring), so a
//! misconfigured rig aborts the session up front instead of mid-trial.

use crate::calibration::{CalibrationError, WaterCalibration};
use crate::history::TrialRecord;
use crate::prng::Prng;
use crate::rig::EventLog;
use crate::settings::TrainingSettings;
use crate::state_machine::{BuildError, StateMachine};
use thiserror::Error;

pub const HABITUATION: &str = "habituation";
pub const FOLLOW_THE_LIGHT: &str = "follow_the_light";
pub const SIMPLE: &str = "simple";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Settings(#[from] crate::settings::SettingsError),
    #[error("build_trial called before start()")]
    NotStarted,
    #[error("unknown task {0:?}")]
    UnknownTask(String),
}

pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    /// Human-readable description, shown when the task is selected manually.
    fn info(&self) -> &'static str;

    /// Called once when the session starts. Resolves valve open durations
    /// and any per-session wiring before the first trial is built.
    fn start(
        &mut self,
        settings: &TrainingSettings,
        calibration: &dyn WaterCalibration,
    ) -> Result<(), TaskError>;

    /// Called once per trial. Returns a complete, validated state machine;
    /// on error no partial graph escapes. Entropy is consumed only to pick
    /// the trial type.
    fn build_trial(&mut self, rng: &mut Prng) -> Result<StateMachine, TaskError>;

    /// Called once after the executor resolves the trial. Classifies the
    /// outcome and registers per-trial measurements; always records water.
    fn after_trial(&mut self, events: &EventLog) -> TrialRecord;

    /// Called when the session is finished.
    fn close(&mut self) {}
}

/// Task registry: maps a settings-level task name to a fresh instance.
pub fn task_for_name(name: &str) -> Result<Box<dyn Task>, TaskError> {
    match name {
        HABITUATION => Ok(Box::new(crate::protocols::habituation::Habituation::new())),
        FOLLOW_THE_LIGHT => Ok(Box::new(
            crate::protocols::follow_the_light::FollowTheLight::new(),
        )),
        SIMPLE => Ok(Box::new(crate::protocols::simple::Simple::new())),
        other => Err(TaskError::UnknownTask(other.to_string())),
    }
}
