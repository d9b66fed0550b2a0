//! Habituation: poke lit ports, get water.
//!
//! The center port lights to start a trial. After a center poke both side
//! ports light up and either one delivers reward. There is no punishment
//! path and no time pressure anywhere in the chain.

use crate::calibration::WaterCalibration;
use crate::history::{TrialRecord, TrialValue};
use crate::outcome::{first_occurrence, Outcome};
use crate::prng::Prng;
use crate::rig::{Event, EventLog, Output, Port};
use crate::settings::TrainingSettings;
use crate::state_machine::{StateMachine, Target};
use crate::task::{Task, TaskError};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Resolved {
    reward_amount_ml: f32,
    light_high: u8,
    left_valve_open: Duration,
    right_valve_open: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct Habituation {
    resolved: Option<Resolved>,
}

impl Habituation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Task for Habituation {
    fn name(&self) -> &'static str {
        crate::task::HABITUATION
    }

    fn info(&self) -> &'static str {
        "Habituation: the center port lights to start a trial; after a center \
         poke both side ports light up and either one delivers reward."
    }

    fn start(
        &mut self,
        settings: &TrainingSettings,
        calibration: &dyn WaterCalibration,
    ) -> Result<(), TaskError> {
        // Both side valves must be calibrated before the first trial.
        let left_valve_open =
            calibration.valve_open_duration(Port::Left, settings.reward_amount_ml)?;
        let right_valve_open =
            calibration.valve_open_duration(Port::Right, settings.reward_amount_ml)?;

        self.resolved = Some(Resolved {
            reward_amount_ml: settings.reward_amount_ml,
            light_high: settings.light_intensity_high,
            left_valve_open,
            right_valve_open,
        });
        Ok(())
    }

    fn build_trial(&mut self, _rng: &mut Prng) -> Result<StateMachine, TaskError> {
        let p = self.resolved.as_ref().ok_or(TaskError::NotStarted)?;

        let mut sm = StateMachine::new();

        sm.add_state(
            "ready_to_initiate",
            None,
            vec![(Event::PortIn(Port::Center), Target::state("stimulus_state"))],
            vec![Output::PortLight(Port::Center, p.light_high)],
        );

        sm.add_state(
            "stimulus_state",
            None,
            vec![
                (Event::PortIn(Port::Left), Target::state("reward_state_left")),
                (
                    Event::PortIn(Port::Right),
                    Target::state("reward_state_right"),
                ),
            ],
            vec![
                Output::PortLight(Port::Left, p.light_high),
                Output::PortLight(Port::Right, p.light_high),
            ],
        );

        sm.add_state(
            "reward_state_left",
            Some(p.left_valve_open),
            vec![(Event::Tup, Target::Exit)],
            vec![Output::Valve(Port::Left)],
        );

        sm.add_state(
            "reward_state_right",
            Some(p.right_valve_open),
            vec![(Event::Tup, Target::Exit)],
            vec![Output::Valve(Port::Right)],
        );

        sm.validate()?;
        Ok(sm)
    }

    fn after_trial(&mut self, events: &EventLog) -> TrialRecord {
        let reward_ml = self
            .resolved
            .as_ref()
            .map(|p| p.reward_amount_ml)
            .unwrap_or(0.0);

        let first_poke = first_occurrence(
            events,
            &[Event::PortIn(Port::Left), Event::PortIn(Port::Right)],
        );

        // Either side pays out, so any side poke completes the trial.
        let (outcome, water_ml) = match first_poke {
            Some(_) => (Outcome::Correct, reward_ml),
            None => (Outcome::Omitted, 0.0),
        };

        let mut record = TrialRecord::new(outcome, water_ml);
        record.register_value(
            "first_poke",
            TrialValue::Text(match first_poke {
                Some(Event::PortIn(p)) => p.as_str().to_string(),
                _ => "none".to_string(),
            }),
        );
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::CalibrationTable;
    use crate::rig::TimedEvent;
    use crate::state_machine::StateSpec;

    fn started() -> Habituation {
        let mut table = CalibrationTable::new();
        table.set_flow(Port::Left, 0.4);
        table.set_flow(Port::Right, 0.5);
        let mut task = Habituation::new();
        task.start(&TrainingSettings::default(), &table).unwrap();
        task
    }

    // Every simple path from a state to Exit, as state-name chains.
    fn exit_paths(sm: &StateMachine, from: &str, prefix: Vec<String>, out: &mut Vec<Vec<String>>) {
        let state: &StateSpec = sm.state(from).unwrap();
        for (_, target) in &state.transitions {
            match target {
                Target::Exit => {
                    let mut path = prefix.clone();
                    path.push(from.to_string());
                    out.push(path);
                }
                Target::State(next) => {
                    if !prefix.iter().any(|p| p == from) {
                        let mut path = prefix.clone();
                        path.push(from.to_string());
                        exit_paths(sm, next, path, out);
                    }
                }
            }
        }
    }

    #[test]
    fn exactly_two_rewarded_paths_to_exit() {
        let mut task = started();
        let sm = task.build_trial(&mut Prng::new(1)).unwrap();

        let mut paths = Vec::new();
        exit_paths(&sm, "ready_to_initiate", Vec::new(), &mut paths);
        assert_eq!(paths.len(), 2);

        // Both paths end in a valve state with a nonzero open duration.
        for path in &paths {
            let terminal = sm.state(path.last().unwrap()).unwrap();
            assert!(terminal
                .outputs
                .iter()
                .any(|o| matches!(o, Output::Valve(_))));
            assert!(terminal.timer.unwrap() > Duration::ZERO);
        }
    }

    #[test]
    fn missing_calibration_aborts_start() {
        let mut table = CalibrationTable::new();
        table.set_flow(Port::Left, 0.4);
        // Right valve left uncalibrated on purpose.
        let mut task = Habituation::new();
        let err = task
            .start(&TrainingSettings::default(), &table)
            .unwrap_err();
        assert!(matches!(err, TaskError::Calibration(_)));
        assert!(task.build_trial(&mut Prng::new(1)).is_err());
    }

    #[test]
    fn side_poke_records_water_and_omission_records_none() {
        let mut task = started();
        task.build_trial(&mut Prng::new(1)).unwrap();

        let poked: EventLog = vec![
            TimedEvent {
                event: Event::PortIn(Port::Center),
                at: Duration::from_millis(500),
            },
            TimedEvent {
                event: Event::PortIn(Port::Right),
                at: Duration::from_millis(1200),
            },
        ];
        let rec = task.after_trial(&poked);
        assert_eq!(rec.outcome, Outcome::Correct);
        assert!(rec.water_ml > 0.0);

        let silent: EventLog = Vec::new();
        let rec = task.after_trial(&silent);
        assert_eq!(rec.outcome, Outcome::Omitted);
        assert_eq!(rec.water_ml, 0.0);
    }
}
