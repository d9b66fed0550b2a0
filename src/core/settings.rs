//! Subject-scoped training settings.
//!
//! One record per subject, seeded with defaults when the subject is created,
//! read at session start, and mutated only by the training controller between
//! sessions. The schema is explicit: every field the bundled protocols read
//! is typed here, and unknown fields round-trip through `extra` so
//! task-specific additions survive persistence.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Stimulus side × difficulty for one discrimination trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialType {
    LeftEasy,
    RightEasy,
    LeftHard,
    RightHard,
}

impl TrialType {
    /// The port that is lit bright and rewarded on this trial.
    pub fn side(self) -> crate::rig::Port {
        match self {
            TrialType::LeftEasy | TrialType::LeftHard => crate::rig::Port::Left,
            TrialType::RightEasy | TrialType::RightHard => crate::rig::Port::Right,
        }
    }

    /// Hard trials also light the incorrect side at low intensity.
    pub fn is_hard(self) -> bool {
        matches!(self, TrialType::LeftHard | TrialType::RightHard)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left_easy" => Some(TrialType::LeftEasy),
            "right_easy" => Some(TrialType::RightEasy),
            "left_hard" => Some(TrialType::LeftHard),
            "right_hard" => Some(TrialType::RightHard),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrialType::LeftEasy => "left_easy",
            TrialType::RightEasy => "right_easy",
            TrialType::LeftHard => "left_hard",
            TrialType::RightHard => "right_hard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    #[error("reward_amount_ml must be positive, got {0}")]
    NonPositiveReward(f32),
    #[error("reward_floor_ml {floor} exceeds reward_amount_ml {reward}")]
    FloorAboveReward { floor: f32, reward: f32 },
    #[error("trial_types must not be empty")]
    NoTrialTypes,
    #[error("stage numbering starts at 1")]
    StageZero,
    #[error("{field} must be non-negative, got {value}")]
    NegativeDuration { field: &'static str, value: f32 },
}

/// Persistent per-subject parameters.
///
/// Field defaults are the values a freshly created subject starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    /// Task the next session will run, selected by name.
    #[serde(default = "default_next_task")]
    pub next_task: String,

    /// Minimum wait between two sessions of the same subject, seconds.
    #[serde(default = "default_refractory_period_s")]
    pub refractory_period_s: u32,
    /// Session runs at least this long before the subject may leave, seconds.
    #[serde(default = "default_minimum_duration_s")]
    pub minimum_duration_s: u32,
    /// Session is stopped automatically after this long, seconds.
    #[serde(default = "default_maximum_duration_s")]
    pub maximum_duration_s: u32,

    #[serde(default = "default_reward_amount_ml")]
    pub reward_amount_ml: f32,
    /// Reward reduction never goes below this volume.
    #[serde(default = "default_reward_floor_ml")]
    pub reward_floor_ml: f32,

    #[serde(default = "default_stage")]
    pub stage: u32,

    #[serde(default = "default_light_intensity_high")]
    pub light_intensity_high: u8,
    #[serde(default = "default_light_intensity_low")]
    pub light_intensity_low: u8,

    #[serde(default = "default_trial_types")]
    pub trial_types: Vec<TrialType>,

    #[serde(default = "default_punishment_time_s")]
    pub punishment_time_s: f32,
    #[serde(default = "default_iti_time_s")]
    pub iti_time_s: f32,
    #[serde(default = "default_response_time_s")]
    pub response_time_s: f32,

    /// Task-specific fields not in the fixed schema. Preserved verbatim.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_next_task() -> String {
    "habituation".to_string()
}

fn default_refractory_period_s() -> u32 {
    3600 * 4
}

fn default_minimum_duration_s() -> u32 {
    600
}

fn default_maximum_duration_s() -> u32 {
    900
}

fn default_reward_amount_ml() -> f32 {
    0.08
}

fn default_reward_floor_ml() -> f32 {
    0.05
}

fn default_stage() -> u32 {
    1
}

fn default_light_intensity_high() -> u8 {
    255
}

fn default_light_intensity_low() -> u8 {
    50
}

fn default_trial_types() -> Vec<TrialType> {
    vec![
        TrialType::LeftEasy,
        TrialType::RightEasy,
        TrialType::LeftHard,
        TrialType::RightHard,
    ]
}

fn default_punishment_time_s() -> f32 {
    1.0
}

fn default_iti_time_s() -> f32 {
    2.0
}

fn default_response_time_s() -> f32 {
    10.0
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            next_task: default_next_task(),
            refractory_period_s: default_refractory_period_s(),
            minimum_duration_s: default_minimum_duration_s(),
            maximum_duration_s: default_maximum_duration_s(),
            reward_amount_ml: default_reward_amount_ml(),
            reward_floor_ml: default_reward_floor_ml(),
            stage: default_stage(),
            light_intensity_high: default_light_intensity_high(),
            light_intensity_low: default_light_intensity_low(),
            trial_types: default_trial_types(),
            punishment_time_s: default_punishment_time_s(),
            iti_time_s: default_iti_time_s(),
            response_time_s: default_response_time_s(),
            extra: HashMap::new(),
        }
    }
}

impl TrainingSettings {
    /// Validates a loaded record before a session reads it.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.reward_amount_ml <= 0.0 {
            return Err(SettingsError::NonPositiveReward(self.reward_amount_ml));
        }
        if self.reward_floor_ml > self.reward_amount_ml {
            return Err(SettingsError::FloorAboveReward {
                floor: self.reward_floor_ml,
                reward: self.reward_amount_ml,
            });
        }
        if self.trial_types.is_empty() {
            return Err(SettingsError::NoTrialTypes);
        }
        if self.stage == 0 {
            return Err(SettingsError::StageZero);
        }
        for (field, value) in [
            ("punishment_time_s", self.punishment_time_s),
            ("iti_time_s", self.iti_time_s),
            ("response_time_s", self.response_time_s),
        ] {
            if value < 0.0 {
                return Err(SettingsError::NegativeDuration { field, value });
            }
        }
        Ok(())
    }

    pub fn response_window(&self) -> Duration {
        Duration::from_secs_f32(self.response_time_s)
    }

    pub fn punishment_time(&self) -> Duration {
        Duration::from_secs_f32(self.punishment_time_s)
    }

    pub fn iti_time(&self) -> Duration {
        Duration::from_secs_f32(self.iti_time_s)
    }

    pub fn maximum_duration(&self) -> Duration {
        Duration::from_secs(self.maximum_duration_s as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rig::Port;

    #[test]
    fn defaults_validate() {
        let s = TrainingSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.next_task, "habituation");
        assert_eq!(s.stage, 1);
        assert_eq!(s.trial_types.len(), 4);
    }

    #[test]
    fn trial_type_sides_and_difficulty() {
        assert_eq!(TrialType::LeftHard.side(), Port::Left);
        assert_eq!(TrialType::RightEasy.side(), Port::Right);
        assert!(TrialType::LeftHard.is_hard());
        assert!(!TrialType::RightEasy.is_hard());
        assert_eq!(TrialType::parse("right_hard"), Some(TrialType::RightHard));
        assert_eq!(TrialType::parse("middle_easy"), None);
    }

    #[test]
    fn floor_above_reward_is_rejected() {
        let s = TrainingSettings {
            reward_amount_ml: 0.04,
            ..TrainingSettings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(SettingsError::FloorAboveReward { .. })
        ));
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let json = r#"{"next_task":"habituation","sound_gain":0.05}"#;
        let s: TrainingSettings = serde_json::from_str(json).unwrap();
        assert!(s.extra.contains_key("sound_gain"));
        let back = serde_json::to_string(&s).unwrap();
        assert!(back.contains("sound_gain"));
    }
}
