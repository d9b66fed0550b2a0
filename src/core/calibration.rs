//! Valve calibration lookup.
//!
//! Fluid delivery is timed: a reward volume is converted to a valve open
//! duration using per-port calibration data measured on the rig. A port
//! without calibration data is a hard failure: the caller aborts the
//! session rather than guess a flow rate.

use crate::rig::Port;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CalibrationError {
    #[error("no calibration recorded for the {port} valve")]
    NotCalibrated { port: Port },
    #[error("cannot deliver non-positive volume {0} ml")]
    InvalidVolume(f32),
}

/// Maps (port, volume) to a valve open duration.
pub trait WaterCalibration {
    fn valve_open_duration(
        &self,
        port: Port,
        volume_ml: f32,
    ) -> Result<Duration, CalibrationError>;
}

/// Calibration data as measured flow rates, one per port.
///
/// Open duration is `volume / flow`. Ports absent from the table (or with a
/// non-positive measured flow) count as uncalibrated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibrationTable {
    /// Milliliters delivered per second of open time.
    flow_ml_per_s: HashMap<Port, f32>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_flow(&mut self, port: Port, ml_per_s: f32) {
        self.flow_ml_per_s.insert(port, ml_per_s);
    }

    pub fn is_calibrated(&self, port: Port) -> bool {
        self.flow_ml_per_s
            .get(&port)
            .is_some_and(|&flow| flow > 0.0)
    }
}

impl WaterCalibration for CalibrationTable {
    fn valve_open_duration(
        &self,
        port: Port,
        volume_ml: f32,
    ) -> Result<Duration, CalibrationError> {
        if volume_ml <= 0.0 {
            return Err(CalibrationError::InvalidVolume(volume_ml));
        }
        let flow = self
            .flow_ml_per_s
            .get(&port)
            .copied()
            .filter(|&f| f > 0.0)
            .ok_or(CalibrationError::NotCalibrated { port })?;
        Ok(Duration::from_secs_f32(volume_ml / flow))
    }
}
