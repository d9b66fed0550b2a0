//! # operant
//!
//! A closed-loop trial engine for animal behavior experiments.
//!
//! A declarative trial design is turned into a timed state machine, run on a
//! rig (hardware or simulated), scored from the event log, and fed back into
//! a training controller that adapts task, stage, and reward across
//! sessions.
//!
//! ## Quick Start
//!
//! ```
//! use operant::prelude::*;
//! use std::sync::atomic::AtomicBool;
//!
//! let settings = TrainingSettings::default();
//! let mut calibration = CalibrationTable::new();
//! calibration.set_flow(Port::Left, 0.4);
//! calibration.set_flow(Port::Right, 0.5);
//!
//! let mut task = task_for_name(&settings.next_task).unwrap();
//! let mut rig = SimulatedRig::new(42);
//! let mut rng = Prng::new(7);
//! let stop = AtomicBool::new(false);
//!
//! let record = run_session(
//!     task.as_mut(),
//!     &settings,
//!     &calibration,
//!     &mut rig,
//!     &mut rng,
//!     SessionLimits::default().with_max_trials(10),
//!     &stop,
//!     0,
//! )
//! .unwrap();
//! assert_eq!(record.trial_count(), 10);
//! ```
//!
//! ## Modules
//!
//! - [`rig`]: hardware vocabulary (ports, events, outputs)
//! - [`state_machine`]: per-trial graph construction and validation
//! - [`task`]: the four-operation protocol interface and registry
//! - [`protocols`]: the bundled habituation / discrimination / smoke tasks
//! - [`outcome`]: event-log scanning and trial classification
//! - [`history`]: trial/session records and the subject history store
//! - [`training`]: the cross-session adaptive controller
//! - [`session`]: the sequential trial loop
//! - [`sim`]: a seeded software rig for tests, demos, and the daemon

#[path = "core/rig.rs"]
pub mod rig;

#[path = "core/state_machine.rs"]
pub mod state_machine;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/settings.rs"]
pub mod settings;

#[path = "core/calibration.rs"]
pub mod calibration;

#[path = "core/outcome.rs"]
pub mod outcome;

#[path = "core/history.rs"]
pub mod history;

#[path = "core/executor.rs"]
pub mod executor;

#[path = "core/task.rs"]
pub mod task;

#[path = "core/training.rs"]
pub mod training;

#[path = "core/session.rs"]
pub mod session;

pub mod protocols;
pub mod sim;

/// Prelude module for convenient imports.
///
/// ```
/// use operant::prelude::*;
/// ```
pub mod prelude {
    pub use crate::calibration::{CalibrationError, CalibrationTable, WaterCalibration};
    pub use crate::executor::{ExecutorError, TrialExecutor};
    pub use crate::history::{
        MemoryHistory, SessionHistory, SessionRecord, TrialRecord, TrialValue,
    };
    pub use crate::outcome::{classify, first_occurrence, Outcome};
    pub use crate::prng::Prng;
    pub use crate::rig::{Event, EventLog, Output, Port, TimedEvent};
    pub use crate::session::{run_session, SessionError, SessionLimits};
    pub use crate::settings::{TrainingSettings, TrialType};
    pub use crate::sim::SimulatedRig;
    pub use crate::state_machine::{BuildError, StateMachine, StateSpec, Target};
    pub use crate::task::{task_for_name, Task, TaskError};
    pub use crate::training::{update, SettingsDelta};
}
