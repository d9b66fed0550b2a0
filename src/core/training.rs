//! Adaptive training controller.
//!
//! Runs once per completed session, before the next session's task is built.
//! Reads session history, decides whether the subject graduates to the next
//! task or stage, and emits a delta against the persistent settings. The
//! controller is a ratchet: task and stage only ever advance here.

use crate::history::{SessionHistory, SessionRecord};
use crate::settings::TrainingSettings;
use crate::task::{FOLLOW_THE_LIGHT, HABITUATION};

/// Sessions of a task required before its advancement rule is considered.
pub const MIN_SESSIONS: usize = 2;
/// Trials a session needs to count toward advancement.
pub const MIN_TRIALS: u32 = 100;
/// Accuracy each of the two most recent sessions must independently reach.
pub const MIN_ACCURACY: f32 = 0.85;
/// Highest stage the bundled curriculum defines.
pub const MAX_STAGE: u32 = 2;

/// Reward volumes walked top-down as training advances.
pub const REWARD_LADDER_ML: [f32; 3] = [0.08, 0.07, 0.05];

/// Pending settings mutations from one controller run.
///
/// Applied as a unit: either every field of a fired rule lands, or none.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsDelta {
    pub next_task: Option<String>,
    pub stage: Option<u32>,
    pub reward_amount_ml: Option<f32>,
}

impl SettingsDelta {
    pub fn is_empty(&self) -> bool {
        self.next_task.is_none() && self.stage.is_none() && self.reward_amount_ml.is_none()
    }

    pub fn apply(&self, settings: &mut TrainingSettings) {
        if let Some(task) = &self.next_task {
            settings.next_task = task.clone();
        }
        if let Some(stage) = self.stage {
            settings.stage = stage;
        }
        if let Some(reward) = self.reward_amount_ml {
            settings.reward_amount_ml = reward;
        }
    }
}

/// Next rung down the reward ladder, clamped to the configured floor.
fn lowered_reward(current_ml: f32, floor_ml: f32) -> f32 {
    let next = REWARD_LADDER_ML
        .iter()
        .copied()
        .find(|&v| v < current_ml - 1e-6)
        .unwrap_or(floor_ml);
    next.max(floor_ml)
}

fn clears_bar(session: &SessionRecord) -> bool {
    session.trial_count() >= MIN_TRIALS && session.accuracy() >= MIN_ACCURACY
}

/// Decides settings changes from the session that just finished.
///
/// Rules, in precedence order; each is evaluated per-session, never pooled:
///
/// 1. Habituation done and `next_task` still habituation: with at least
///    [`MIN_SESSIONS`] habituation sessions on record and [`MIN_TRIALS`]
///    trials in the most recent one, graduate to follow-the-light and lower
///    the reward one rung.
/// 2. Follow-the-light done below [`MAX_STAGE`]: with at least
///    [`MIN_SESSIONS`] sessions and the two most recent each independently
///    clearing [`MIN_TRIALS`] and [`MIN_ACCURACY`], advance the stage and
///    lower the reward one rung.
/// 3. Otherwise: empty delta, settings carry over unchanged.
///
/// Too little history just skips a rule; it is not an error. The guards on
/// `next_task` and `stage` make a repeat invocation on unchanged history a
/// no-op.
pub fn update(
    last_task: &str,
    settings: &TrainingSettings,
    history: &dyn SessionHistory,
) -> SettingsDelta {
    let mut delta = SettingsDelta::default();

    if last_task == HABITUATION && settings.next_task == HABITUATION {
        let sessions = history.sessions_for(HABITUATION);
        if sessions.len() >= MIN_SESSIONS {
            let latest = sessions[sessions.len() - 1];
            // Only the most recent session's trial count matters here, not
            // the cumulative total.
            if latest.trial_count() >= MIN_TRIALS {
                delta.next_task = Some(FOLLOW_THE_LIGHT.to_string());
                delta.reward_amount_ml = Some(lowered_reward(
                    settings.reward_amount_ml,
                    settings.reward_floor_ml,
                ));
            }
        }
    } else if last_task == FOLLOW_THE_LIGHT && settings.stage < MAX_STAGE {
        let sessions = history.sessions_for(FOLLOW_THE_LIGHT);
        if sessions.len() >= MIN_SESSIONS {
            let latest = sessions[sessions.len() - 1];
            let previous = sessions[sessions.len() - 2];
            if clears_bar(latest) && clears_bar(previous) {
                delta.stage = Some(settings.stage + 1);
                delta.reward_amount_ml = Some(lowered_reward(
                    settings.reward_amount_ml,
                    settings.reward_floor_ml,
                ));
            }
        }
    }

    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{MemoryHistory, TrialRecord};
    use crate::outcome::Outcome;

    fn session_with(task: &str, at: u64, trials: u32, accuracy: f32) -> SessionRecord {
        let correct = (trials as f32 * accuracy).round() as u32;
        let mut s = SessionRecord::new(task, at);
        for i in 0..trials {
            let outcome = if i < correct {
                Outcome::Correct
            } else {
                Outcome::Incorrect
            };
            s.push(TrialRecord::new(outcome, 0.0));
        }
        s
    }

    #[test]
    fn habituation_graduates_on_a_busy_second_session() {
        let mut history = MemoryHistory::new("m01");
        history.push(session_with(HABITUATION, 1, 80, 1.0));
        history.push(session_with(HABITUATION, 2, 120, 1.0));

        let settings = TrainingSettings::default();
        let delta = update(HABITUATION, &settings, &history);
        assert_eq!(delta.next_task.as_deref(), Some(FOLLOW_THE_LIGHT));
        let new_reward = delta.reward_amount_ml.unwrap();
        assert!(new_reward < settings.reward_amount_ml);
        assert!((new_reward - 0.07).abs() < 1e-6);
    }

    #[test]
    fn habituation_needs_two_sessions_and_a_recent_hundred() {
        let settings = TrainingSettings::default();

        // One session only: rule skipped.
        let mut history = MemoryHistory::new("m01");
        history.push(session_with(HABITUATION, 1, 150, 1.0));
        assert!(update(HABITUATION, &settings, &history).is_empty());

        // Two sessions, but the latest is light: cumulative count is not
        // consulted, so no graduation.
        history.push(session_with(HABITUATION, 2, 60, 1.0));
        assert!(update(HABITUATION, &settings, &history).is_empty());
    }

    #[test]
    fn stage_advances_when_both_recent_sessions_clear_the_bar() {
        let mut history = MemoryHistory::new("m01");
        history.push(session_with(FOLLOW_THE_LIGHT, 1, 110, 0.90));
        history.push(session_with(FOLLOW_THE_LIGHT, 2, 150, 0.87));

        let settings = TrainingSettings {
            next_task: FOLLOW_THE_LIGHT.to_string(),
            reward_amount_ml: 0.07,
            ..TrainingSettings::default()
        };
        let delta = update(FOLLOW_THE_LIGHT, &settings, &history);
        assert_eq!(delta.stage, Some(2));
        assert!((delta.reward_amount_ml.unwrap() - 0.05).abs() < 1e-6);
    }

    #[test]
    fn one_weak_session_blocks_advancement_despite_a_strong_pool() {
        // Pooled accuracy would pass 0.85; the per-session rule must not.
        let mut history = MemoryHistory::new("m01");
        history.push(session_with(FOLLOW_THE_LIGHT, 1, 200, 0.90));
        history.push(session_with(FOLLOW_THE_LIGHT, 2, 110, 0.80));

        let settings = TrainingSettings {
            next_task: FOLLOW_THE_LIGHT.to_string(),
            reward_amount_ml: 0.07,
            ..TrainingSettings::default()
        };
        assert!(update(FOLLOW_THE_LIGHT, &settings, &history).is_empty());
    }

    #[test]
    fn update_is_idempotent_without_a_new_session() {
        let mut history = MemoryHistory::new("m01");
        history.push(session_with(HABITUATION, 1, 120, 1.0));
        history.push(session_with(HABITUATION, 2, 120, 1.0));

        let mut settings = TrainingSettings::default();
        let delta = update(HABITUATION, &settings, &history);
        assert!(!delta.is_empty());
        delta.apply(&mut settings);

        // Same history, same last task: the transition already happened, so
        // nothing fires again.
        assert!(update(HABITUATION, &settings, &history).is_empty());
    }

    #[test]
    fn stage_is_a_ratchet_capped_at_the_curriculum_top() {
        let mut history = MemoryHistory::new("m01");
        history.push(session_with(FOLLOW_THE_LIGHT, 1, 150, 0.95));
        history.push(session_with(FOLLOW_THE_LIGHT, 2, 150, 0.95));

        let settings = TrainingSettings {
            next_task: FOLLOW_THE_LIGHT.to_string(),
            stage: 2,
            reward_amount_ml: 0.05,
            ..TrainingSettings::default()
        };
        assert!(update(FOLLOW_THE_LIGHT, &settings, &history).is_empty());
    }

    #[test]
    fn reward_never_drops_below_the_floor() {
        assert!((lowered_reward(0.08, 0.05) - 0.07).abs() < 1e-6);
        assert!((lowered_reward(0.07, 0.05) - 0.05).abs() < 1e-6);
        assert!((lowered_reward(0.05, 0.05) - 0.05).abs() < 1e-6);
        // A floor above the next rung wins.
        assert!((lowered_reward(0.07, 0.06) - 0.06).abs() < 1e-6);
    }

    #[test]
    fn unrelated_task_leaves_settings_alone() {
        let mut history = MemoryHistory::new("m01");
        history.push(session_with(crate::task::SIMPLE, 1, 500, 1.0));
        history.push(session_with(crate::task::SIMPLE, 2, 500, 1.0));
        let settings = TrainingSettings::default();
        assert!(update(crate::task::SIMPLE, &settings, &history).is_empty());
    }
}
