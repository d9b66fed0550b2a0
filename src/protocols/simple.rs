//! Minimal two-state protocol used as a rig smoke test: one second of light,
//! then out. No calibration, no response, no water.

use crate::calibration::WaterCalibration;
use crate::history::TrialRecord;
use crate::outcome::Outcome;
use crate::prng::Prng;
use crate::rig::{Event, EventLog, Output, Port};
use crate::settings::TrainingSettings;
use crate::state_machine::{StateMachine, Target};
use crate::task::{Task, TaskError};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Simple {
    started: bool,
}

impl Simple {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Task for Simple {
    fn name(&self) -> &'static str {
        crate::task::SIMPLE
    }

    fn info(&self) -> &'static str {
        "Simple: timed two-state chain, one second of left-port light per \
         trial. Useful for checking a rig without a subject."
    }

    fn start(
        &mut self,
        _settings: &TrainingSettings,
        _calibration: &dyn WaterCalibration,
    ) -> Result<(), TaskError> {
        self.started = true;
        Ok(())
    }

    fn build_trial(&mut self, _rng: &mut Prng) -> Result<StateMachine, TaskError> {
        if !self.started {
            return Err(TaskError::NotStarted);
        }

        let mut sm = StateMachine::new();
        sm.add_state(
            "one",
            Some(Duration::from_secs(1)),
            vec![(Event::Tup, Target::state("two"))],
            vec![Output::PortLight(Port::Left, 255)],
        );
        // Zero timer: the Tup edge fires immediately on entry.
        sm.add_state(
            "two",
            Some(Duration::ZERO),
            vec![(Event::Tup, Target::Exit)],
            vec![],
        );

        sm.validate()?;
        Ok(sm)
    }

    fn after_trial(&mut self, _events: &EventLog) -> TrialRecord {
        // Nothing to classify and nothing delivered; water is still recorded.
        TrialRecord::new(Outcome::Omitted, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTable;

    #[test]
    fn builds_a_valid_timed_chain() {
        let mut task = Simple::new();
        task.start(&TrainingSettings::default(), &CalibrationTable::new())
            .unwrap();
        let sm = task.build_trial(&mut Prng::new(1)).unwrap();
        assert_eq!(sm.len(), 2);
        assert_eq!(sm.entry().unwrap().name, "one");
    }

    #[test]
    fn build_before_start_is_rejected() {
        let mut task = Simple::new();
        assert!(matches!(
            task.build_trial(&mut Prng::new(1)),
            Err(TaskError::NotStarted)
        ));
    }
}
