//! Hardware vocabulary of a three-port operant box.
//!
//! The controller board reports a closed set of events (port photogate
//! crossings plus state-timer expiry) and accepts a closed set of output
//! assertions (port lights, fluid valves, BNC sync lines). Everything above
//! this module treats the vocabulary as opaque labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// One of the three nose ports, left to right as the subject faces the wall.
///
/// Hardware channel numbering is 1-based: left = 1, center = 2, right = 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    Left,
    Center,
    Right,
}

impl Port {
    pub fn index(self) -> u8 {
        match self {
            Port::Left => 1,
            Port::Center => 2,
            Port::Right => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "1" => Some(Port::Left),
            "center" | "2" => Some(Port::Center),
            "right" | "3" => Some(Port::Right),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Port::Left => "left",
            Port::Center => "center",
            Port::Right => "right",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hardware-reported occurrence that can trigger a state transition.
///
/// `Tup` is the state-timer expiry pseudo-event: it appears both in event
/// logs and as the timeout key in a state's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    PortIn(Port),
    PortOut(Port),
    Tup,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::PortIn(p) => write!(f, "Port{}In", p.index()),
            Event::PortOut(p) => write!(f, "Port{}Out", p.index()),
            Event::Tup => f.write_str("Tup"),
        }
    }
}

/// An output assertion applied on state entry and released on state exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Output {
    /// Port light at a PWM intensity, 0 (off) to 255 (full).
    PortLight(Port, u8),
    /// Fluid valve open for the duration of the state.
    Valve(Port),
    /// Binary sync line, high or low.
    Bnc(u8, bool),
}

/// An event with its timestamp relative to trial start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub event: Event,
    pub at: Duration,
}

/// Ordered record of everything the rig reported during one trial.
pub type EventLog = Vec<TimedEvent>;
