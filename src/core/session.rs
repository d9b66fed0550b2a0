//! Session runner: the strictly sequential trial loop.
//!
//! One graph is built, executed to its terminal state, and evaluated before
//! the next trial begins. The stop flag is cooperative and honored at trial
//! boundaries only, never mid-trial; the executor's own timeout edges are
//! the sole way out of a running graph.

use crate::calibration::WaterCalibration;
use crate::executor::{ExecutorError, TrialExecutor};
use crate::history::SessionRecord;
use crate::prng::Prng;
use crate::settings::TrainingSettings;
use crate::task::{Task, TaskError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Task(#[from] TaskError),
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Bounds on a single session.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLimits {
    pub max_trials: Option<u32>,
    /// Accumulated trial time after which the session closes.
    pub max_duration: Option<Duration>,
}

impl SessionLimits {
    pub fn from_settings(settings: &TrainingSettings) -> Self {
        Self {
            max_trials: None,
            max_duration: Some(settings.maximum_duration()),
        }
    }

    pub fn with_max_trials(mut self, max_trials: u32) -> Self {
        self.max_trials = Some(max_trials);
        self
    }
}

/// Runs one complete session of `task` and returns its record.
///
/// `start` failures (missing calibration above all) abort before the first
/// trial; the session is never silently skipped, the error propagates to
/// the operator. The caller appends the returned record to history and
/// stamps `started_at_ms` from its own clock.
pub fn run_session(
    task: &mut dyn Task,
    settings: &TrainingSettings,
    calibration: &dyn WaterCalibration,
    executor: &mut dyn TrialExecutor,
    rng: &mut Prng,
    limits: SessionLimits,
    stop: &AtomicBool,
    started_at_ms: u64,
) -> Result<SessionRecord, SessionError> {
    task.start(settings, calibration)?;

    let mut record = SessionRecord::new(task.name(), started_at_ms);
    let mut elapsed = Duration::ZERO;

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        if limits
            .max_trials
            .is_some_and(|max| record.trial_count() >= max)
        {
            break;
        }
        if limits.max_duration.is_some_and(|max| elapsed >= max) {
            break;
        }

        let trial = task.build_trial(rng)?;
        let log = executor.run(&trial)?;
        if let Some(last) = log.last() {
            elapsed += last.at;
        }
        record.push(task.after_trial(&log));
    }

    task.close();
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTable;
    use crate::rig::Port;
    use crate::sim::SimulatedRig;
    use crate::task::task_for_name;

    fn rig_calibration() -> CalibrationTable {
        let mut table = CalibrationTable::new();
        table.set_flow(Port::Left, 0.4);
        table.set_flow(Port::Right, 0.5);
        table
    }

    #[test]
    fn trial_budget_bounds_the_session() {
        let mut task = task_for_name(crate::task::HABITUATION).unwrap();
        let settings = TrainingSettings::default();
        let mut rig = SimulatedRig::new(42);
        let mut rng = Prng::new(7);
        let stop = AtomicBool::new(false);

        let record = run_session(
            task.as_mut(),
            &settings,
            &rig_calibration(),
            &mut rig,
            &mut rng,
            SessionLimits::default().with_max_trials(25),
            &stop,
            1_000,
        )
        .unwrap();

        assert_eq!(record.trial_count(), 25);
        assert_eq!(record.task, crate::task::HABITUATION);
        assert_eq!(record.started_at_ms, 1_000);
    }

    #[test]
    fn stop_flag_prevents_any_further_trials() {
        let mut task = task_for_name(crate::task::HABITUATION).unwrap();
        let settings = TrainingSettings::default();
        let mut rig = SimulatedRig::new(42);
        let mut rng = Prng::new(7);

        let stop = AtomicBool::new(true);
        let record = run_session(
            task.as_mut(),
            &settings,
            &rig_calibration(),
            &mut rig,
            &mut rng,
            SessionLimits::default().with_max_trials(25),
            &stop,
            0,
        )
        .unwrap();
        assert_eq!(record.trial_count(), 0);
    }

    #[test]
    fn missing_calibration_aborts_the_session() {
        let mut task = task_for_name(crate::task::FOLLOW_THE_LIGHT).unwrap();
        let settings = TrainingSettings::default();
        let mut rig = SimulatedRig::new(42);
        let mut rng = Prng::new(7);
        let stop = AtomicBool::new(false);

        let err = run_session(
            task.as_mut(),
            &settings,
            &CalibrationTable::new(),
            &mut rig,
            &mut rng,
            SessionLimits::default().with_max_trials(5),
            &stop,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, SessionError::Task(TaskError::Calibration(_))));
    }

    #[test]
    fn accumulated_trial_time_closes_the_session() {
        let mut task = task_for_name(crate::task::SIMPLE).unwrap();
        let settings = TrainingSettings::default();
        let mut rig = SimulatedRig::new(42);
        let mut rng = Prng::new(7);
        let stop = AtomicBool::new(false);

        // Each simple trial lasts one second of simulated time.
        let limits = SessionLimits {
            max_trials: None,
            max_duration: Some(Duration::from_secs(5)),
        };
        let record = run_session(
            task.as_mut(),
            &settings,
            &CalibrationTable::new(),
            &mut rig,
            &mut rng,
            limits,
            &stop,
            0,
        )
        .unwrap();
        assert!(record.trial_count() >= 5);
        assert!(record.trial_count() <= 6);
    }
}
