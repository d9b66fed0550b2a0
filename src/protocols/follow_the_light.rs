//! Follow-the-light: a two-alternative visual discrimination task.
//!
//! A center poke starts the trial, then one side port lights bright (on hard
//! trials the other side also lights dim). Poking the bright side rewards;
//! poking the other side either allows a free second choice (stage 1) or
//! punishes with a timeout (stage 2 and up). The stage only rewires where an
//! incorrect first response lands; the rest of the graph is identical across
//! stages, and the rewiring is decided once per session.

use crate::calibration::WaterCalibration;
use crate::history::{TrialRecord, TrialValue};
use crate::outcome::{classify, first_occurrence};
use crate::prng::Prng;
use crate::rig::{Event, EventLog, Output, Port};
use crate::settings::{TrainingSettings, TrialType};
use crate::state_machine::{StateMachine, Target};
use crate::task::{Task, TaskError};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Resolved {
    reward_amount_ml: f32,
    light_high: u8,
    light_low: u8,
    response_window: Duration,
    punishment_time: Duration,
    iti_time: Duration,
    left_valve_open: Duration,
    right_valve_open: Duration,
    trial_types: Vec<TrialType>,
    /// Where an incorrect first response lands. Stage 1 sends the subject
    /// back to the stimulus for a free second choice; stage 2 and up punish.
    incorrect_target: Target,
}

#[derive(Debug, Clone, Default)]
pub struct FollowTheLight {
    resolved: Option<Resolved>,
    this_trial_type: Option<TrialType>,
}

impl FollowTheLight {
    pub fn new() -> Self {
        Self::default()
    }

    fn build_for(p: &Resolved, trial_type: TrialType) -> Result<StateMachine, TaskError> {
        let correct = trial_type.side();
        let incorrect = match correct {
            Port::Left => Port::Right,
            _ => Port::Left,
        };

        let mut stimulus_outputs = vec![Output::PortLight(correct, p.light_high)];
        if trial_type.is_hard() {
            stimulus_outputs.push(Output::PortLight(incorrect, p.light_low));
        }

        let poke_target = |port: Port| -> Target {
            if port == correct {
                Target::state("reward_state")
            } else {
                p.incorrect_target.clone()
            }
        };

        let (valve_port, valve_open) = match correct {
            Port::Left => (Port::Left, p.left_valve_open),
            _ => (Port::Right, p.right_valve_open),
        };

        let mut sm = StateMachine::new();

        sm.add_state(
            "ready_to_initiate",
            None,
            vec![(Event::PortIn(Port::Center), Target::state("stimulus_state"))],
            vec![Output::PortLight(Port::Center, p.light_high)],
        );

        sm.add_state(
            "stimulus_state",
            Some(p.response_window),
            vec![
                (Event::PortIn(Port::Left), poke_target(Port::Left)),
                (Event::PortIn(Port::Right), poke_target(Port::Right)),
                (Event::Tup, Target::Exit),
            ],
            stimulus_outputs,
        );

        sm.add_state(
            "reward_state",
            Some(valve_open),
            vec![(Event::Tup, Target::state("iti_state"))],
            vec![Output::Valve(valve_port)],
        );

        sm.add_state(
            "punish_state",
            Some(p.punishment_time),
            vec![(Event::Tup, Target::state("iti_state"))],
            vec![],
        );

        sm.add_state(
            "iti_state",
            Some(p.iti_time),
            vec![(Event::Tup, Target::Exit)],
            vec![],
        );

        sm.validate()?;
        Ok(sm)
    }
}

impl Task for FollowTheLight {
    fn name(&self) -> &'static str {
        crate::task::FOLLOW_THE_LIGHT
    }

    fn info(&self) -> &'static str {
        "Follow the light: poke the center port to start, then poke the \
         brightly lit side port for reward. Stage 1 allows a free second \
         choice after a wrong poke; stage 2 punishes it with a timeout."
    }

    fn start(
        &mut self,
        settings: &TrainingSettings,
        calibration: &dyn WaterCalibration,
    ) -> Result<(), TaskError> {
        settings.validate()?;

        let left_valve_open =
            calibration.valve_open_duration(Port::Left, settings.reward_amount_ml)?;
        let right_valve_open =
            calibration.valve_open_duration(Port::Right, settings.reward_amount_ml)?;

        // Decided once per session, reused by every build_trial.
        let incorrect_target = if settings.stage == 1 {
            Target::state("stimulus_state")
        } else {
            Target::state("punish_state")
        };

        self.resolved = Some(Resolved {
            reward_amount_ml: settings.reward_amount_ml,
            light_high: settings.light_intensity_high,
            light_low: settings.light_intensity_low,
            response_window: settings.response_window(),
            punishment_time: settings.punishment_time(),
            iti_time: settings.iti_time(),
            left_valve_open,
            right_valve_open,
            trial_types: settings.trial_types.clone(),
            incorrect_target,
        });
        Ok(())
    }

    fn build_trial(&mut self, rng: &mut Prng) -> Result<StateMachine, TaskError> {
        let p = self.resolved.as_ref().ok_or(TaskError::NotStarted)?;
        let trial_type = match rng.pick(&p.trial_types) {
            Some(t) => *t,
            None => return Err(crate::settings::SettingsError::NoTrialTypes.into()),
        };
        self.this_trial_type = Some(trial_type);
        Self::build_for(p, trial_type)
    }

    fn after_trial(&mut self, events: &EventLog) -> TrialRecord {
        let reward_ml = self
            .resolved
            .as_ref()
            .map(|p| p.reward_amount_ml)
            .unwrap_or(0.0);
        // after_trial without a built trial records a typeless omission.
        let Some(trial_type) = self.this_trial_type else {
            return TrialRecord::new(crate::outcome::Outcome::Omitted, 0.0);
        };

        let first_poke = first_occurrence(
            events,
            &[Event::PortIn(Port::Left), Event::PortIn(Port::Right)],
        );
        let outcome = classify(first_poke, trial_type);

        // Water reflects what the rig actually delivered: the valve opens
        // only on the reward path.
        let water_ml = if outcome.is_correct() { reward_ml } else { 0.0 };

        let mut record = TrialRecord::new(outcome, water_ml).with_trial_type(trial_type);
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
    use crate::outcome::Outcome;
    use crate::rig::TimedEvent;

    fn started(stage: u32) -> FollowTheLight {
        let mut table = CalibrationTable::new();
        table.set_flow(Port::Left, 0.4);
        table.set_flow(Port::Right, 0.5);
        let settings = TrainingSettings {
            stage,
            ..TrainingSettings::default()
        };
        let mut task = FollowTheLight::new();
        task.start(&settings, &table).unwrap();
        task
    }

    #[test]
    fn stage_one_never_reaches_punishment() {
        let mut task = started(1);
        let mut rng = Prng::new(3);
        for _ in 0..8 {
            let sm = task.build_trial(&mut rng).unwrap();
            let reachable = sm.reachable_from("stimulus_state");
            assert!(!reachable.contains("punish_state"));
            assert!(reachable.contains("reward_state"));
            // The free second choice loops back to the stimulus.
            assert!(reachable.contains("stimulus_state"));
        }
    }

    #[test]
    fn stage_two_reaches_both_reward_and_punishment() {
        let mut task = started(2);
        let sm = task.build_trial(&mut Prng::new(3)).unwrap();
        let reachable = sm.reachable_from("stimulus_state");
        assert!(reachable.contains("reward_state"));
        assert!(reachable.contains("punish_state"));
    }

    #[test]
    fn hard_trials_light_the_wrong_side_dimly() {
        let p = {
            let task = started(2);
            task.resolved.clone().unwrap()
        };

        let easy = FollowTheLight::build_for(&p, TrialType::LeftEasy).unwrap();
        let stim = easy.state("stimulus_state").unwrap();
        assert_eq!(stim.outputs.len(), 1);
        assert_eq!(stim.outputs[0], Output::PortLight(Port::Left, 255));

        let hard = FollowTheLight::build_for(&p, TrialType::LeftHard).unwrap();
        let stim = hard.state("stimulus_state").unwrap();
        assert!(stim.outputs.contains(&Output::PortLight(Port::Left, 255)));
        assert!(stim.outputs.contains(&Output::PortLight(Port::Right, 50)));
    }

    #[test]
    fn response_window_timeout_exits_the_trial() {
        let p = {
            let task = started(2);
            task.resolved.clone().unwrap()
        };
        let sm = FollowTheLight::build_for(&p, TrialType::RightEasy).unwrap();
        let stim = sm.state("stimulus_state").unwrap();
        assert_eq!(stim.timer, Some(Duration::from_secs_f32(10.0)));
        assert!(stim
            .transitions
            .iter()
            .any(|(e, t)| *e == Event::Tup && *t == Target::Exit));
    }

    #[test]
    fn outcome_and_water_follow_the_first_side_poke() {
        let mut task = started(2);
        let mut rng = Prng::new(11);
        let _sm = task.build_trial(&mut rng).unwrap();
        let trial_type = task.this_trial_type.unwrap();

        let correct_side = trial_type.side();
        let log: EventLog = vec![
            TimedEvent {
                event: Event::PortIn(Port::Center),
                at: Duration::from_millis(300),
            },
            TimedEvent {
                event: Event::PortIn(correct_side),
                at: Duration::from_millis(900),
            },
        ];
        let rec = task.after_trial(&log);
        assert_eq!(rec.outcome, Outcome::Correct);
        assert!(rec.water_ml > 0.0);

        // Timeout with no side poke is an omission with zero water.
        let log: EventLog = vec![TimedEvent {
            event: Event::Tup,
            at: Duration::from_secs(10),
        }];
        task.this_trial_type = Some(trial_type);
        let rec = task.after_trial(&log);
        assert_eq!(rec.outcome, Outcome::Omitted);
        assert_eq!(rec.water_ml, 0.0);
    }
}
