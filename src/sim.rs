//! Software stand-in for the hardware runtime.
//!
//! `SimulatedRig` walks a validated trial graph the way the controller board
//! would, with a crude model of a subject on the other side: it pokes lit
//! ports with a configurable bias, sometimes lets the response window lapse,
//! and advances a simulated clock. Seeded, so whole sessions replay exactly.
//!
//! Events can also be injected from outside, mirroring the manual input
//! override used when testing a physical rig without an animal.

use crate::executor::{ExecutorError, TrialExecutor};
use crate::prng::Prng;
use crate::rig::{Event, EventLog, Output, Port, TimedEvent};
use crate::state_machine::{StateMachine, StateSpec, Target};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SimulatedRig {
    rng: Prng,
    /// Chance the subject responds inside a timed response window.
    pub p_engage: f32,
    /// Chance a poke goes to the brightest lit port instead of a random one.
    pub p_follow_light: f32,
    /// Base poke latency; jittered per response.
    pub response_latency: Duration,
    injected: VecDeque<Event>,
    max_state_entries: usize,
}

impl SimulatedRig {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Prng::new(seed),
            p_engage: 0.9,
            p_follow_light: 0.75,
            response_latency: Duration::from_millis(800),
            injected: VecDeque::new(),
            max_state_entries: 64,
        }
    }

    /// Queues an event as if the matching input had been toggled by hand.
    /// Injected events are consumed before any simulated behavior.
    pub fn inject(&mut self, event: Event) {
        self.injected.push_back(event);
    }

    /// The next event the rig reports from `state`, and how long it takes.
    fn decide(&mut self, state: &StateSpec) -> (Event, Duration) {
        if let Some(event) = self.injected.pop_front() {
            return (event, Duration::from_millis(50));
        }

        let ports: Vec<Port> = state
            .transitions
            .iter()
            .filter_map(|(e, _)| match e {
                Event::PortIn(p) => Some(*p),
                _ => None,
            })
            .collect();
        let has_tup = state.transitions.iter().any(|(e, _)| *e == Event::Tup);

        if ports.is_empty() {
            // Output-only state: nothing for the subject to do, the timer
            // carries the trial forward.
            if has_tup {
                if let Some(timer) = state.timer {
                    return (Event::Tup, timer);
                }
            }
            let event = state.transitions[0].0;
            return (event, self.response_latency);
        }

        // Disengaged subject: let the window lapse when the state has one.
        let engaged =
            state.timer.is_none() || !has_tup || self.rng.chance(self.p_engage);
        if !engaged {
            if let Some(timer) = state.timer {
                return (Event::Tup, timer);
            }
        }

        let brightest = state
            .outputs
            .iter()
            .filter_map(|o| match o {
                Output::PortLight(p, i) if *i > 0 => Some((*p, *i)),
                _ => None,
            })
            .max_by_key(|(_, i)| *i)
            .map(|(p, _)| p);

        let port = match brightest {
            Some(b) if ports.contains(&b) && self.rng.chance(self.p_follow_light) => b,
            _ => ports[self.rng.gen_range_usize(0, ports.len())],
        };

        let jitter = 0.5 + self.rng.next_f32_01();
        let mut latency = self.response_latency.mul_f32(jitter);
        if let Some(timer) = state.timer {
            // An engaged response lands inside the window.
            latency = latency.min(timer.saturating_sub(Duration::from_millis(1)));
        }
        (Event::PortIn(port), latency)
    }
}

impl TrialExecutor for SimulatedRig {
    fn run(&mut self, trial: &StateMachine) -> Result<EventLog, ExecutorError> {
        let mut current = trial
            .entry()
            .ok_or_else(|| ExecutorError::UnknownState("<entry>".to_string()))?;

        let mut log = EventLog::new();
        let mut clock = Duration::ZERO;
        let mut entries = 0usize;

        loop {
            entries += 1;
            if entries > self.max_state_entries {
                return Err(ExecutorError::TrialOverrun(self.max_state_entries));
            }

            let (event, dt) = self.decide(current);
            clock += dt;
            log.push(TimedEvent { event, at: clock });

            let hit = current
                .transitions
                .iter()
                .find(|(e, _)| *e == event)
                .map(|(_, t)| t);
            let Some(target) = hit else {
                // Logged, but not a qualifying event for this state.
                continue;
            };

            match target {
                Target::Exit => break,
                Target::State(name) => {
                    current = trial
                        .state(name)
                        .ok_or_else(|| ExecutorError::UnknownState(name.clone()))?;
                }
            }
        }

        Ok(log)
    }
}
