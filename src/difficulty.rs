//! Adaptive difficulty control with hysteresis.
//!
//! The controller keeps a rolling window of composite turn scores and moves
//! the tier one step at a time: N consecutive window averages at or above
//! the high threshold escalate, N consecutive at or below the low threshold
//! de-escalate, and each direction resets the opposing streak so one
//! outlier answer cannot oscillate the tier. Steps past the stage's bounds
//! are no-ops. A turn with no score never reaches `update` — missing
//! analysis is no signal, not a zero.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::catalog::{DifficultyTier, StageConfig};
use crate::shadow::CompetencyScore;

/// Adaptation constants.
///
/// These are deliberately configuration, not requirements: the defaults
/// match the production tuning but every deployment can move them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyConfig {
    /// Rolling window length in scored turns
    pub window: usize,
    /// Window average at or above this escalates
    pub escalate_threshold: f64,
    /// Window average at or below this de-escalates
    pub deescalate_threshold: f64,
    /// Consecutive qualifying averages required before a step
    pub required_streak: u32,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            window: 3,
            escalate_threshold: 75.0,
            deescalate_threshold: 50.0,
            required_streak: 3,
        }
    }
}

/// Rolling adaptation state. Owned exclusively by the controller and only
/// mutated when a competency score arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DifficultyState {
    pub tier: DifficultyTier,
    /// Most recent composite scores, oldest first
    pub window: Vec<f64>,
    pub escalate_streak: u32,
    pub deescalate_streak: u32,
    /// Scored turns consumed so far
    pub updates: u64,
}

impl DifficultyState {
    fn new(tier: DifficultyTier) -> Self {
        Self {
            tier,
            window: Vec::new(),
            escalate_streak: 0,
            deescalate_streak: 0,
            updates: 0,
        }
    }

    /// Rolling average over the current window.
    pub fn rolling_average(&self) -> Option<f64> {
        if self.window.is_empty() {
            return None;
        }
        Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
    }
}

/// Decides the difficulty tier for the next turn from shadow scores.
#[derive(Debug, Clone)]
pub struct DifficultyController {
    config: DifficultyConfig,
    min_tier: DifficultyTier,
    max_tier: DifficultyTier,
    state: DifficultyState,
}

impl DifficultyController {
    pub fn new(config: DifficultyConfig, stage: &StageConfig) -> Self {
        let tier = stage.start_tier.clamp(stage.min_tier, stage.max_tier);
        Self {
            config,
            min_tier: stage.min_tier,
            max_tier: stage.max_tier,
            state: DifficultyState::new(tier),
        }
    }

    /// Tier the next turn should compose at.
    pub fn tier(&self) -> DifficultyTier {
        self.state.tier
    }

    pub fn state(&self) -> &DifficultyState {
        &self.state
    }

    /// Rebind to a new stage's tier bounds on stage transition.
    ///
    /// The current tier carries over (clamped into the new bounds) and the
    /// score window is kept for continuity; the streak counters reset so a
    /// new stage starts from neutral.
    pub fn enter_stage(&mut self, stage: &StageConfig) {
        self.min_tier = stage.min_tier;
        self.max_tier = stage.max_tier;
        self.state.tier = self.state.tier.clamp(stage.min_tier, stage.max_tier);
        self.state.escalate_streak = 0;
        self.state.deescalate_streak = 0;
    }

    /// Consume a score and return the tier for the next turn.
    pub fn update(&mut self, score: &CompetencyScore) -> DifficultyTier {
        let composite = score.composite();
        self.state.window.push(composite);
        if self.state.window.len() > self.config.window {
            let excess = self.state.window.len() - self.config.window;
            self.state.window.drain(..excess);
        }
        self.state.updates += 1;

        let average = self
            .state
            .rolling_average()
            .expect("window is non-empty after push");

        if average >= self.config.escalate_threshold {
            self.state.escalate_streak += 1;
            self.state.deescalate_streak = 0;
        } else if average <= self.config.deescalate_threshold {
            self.state.deescalate_streak += 1;
            self.state.escalate_streak = 0;
        } else {
            self.state.escalate_streak = 0;
            self.state.deescalate_streak = 0;
        }

        if self.state.escalate_streak >= self.config.required_streak {
            let next = self.state.tier.up().clamp(self.min_tier, self.max_tier);
            if next != self.state.tier {
                info!(from = %self.state.tier, to = %next, avg = average, "difficulty escalated");
            }
            self.state.tier = next;
            self.state.escalate_streak = 0;
        } else if self.state.deescalate_streak >= self.config.required_streak {
            let next = self.state.tier.down().clamp(self.min_tier, self.max_tier);
            if next != self.state.tier {
                info!(from = %self.state.tier, to = %next, avg = average, "difficulty de-escalated");
            }
            self.state.tier = next;
            self.state.deescalate_streak = 0;
        }

        self.state.tier
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RubricDimension, StageConfig};
    use crate::shadow::DimensionScore;
    use std::collections::BTreeMap;

    fn score(seq: u64, value: u8) -> CompetencyScore {
        let mut dimensions = BTreeMap::new();
        dimensions.insert(RubricDimension::Communication, DimensionScore::new(value));
        dimensions.insert(RubricDimension::TechnicalDepth, DimensionScore::new(value));
        CompetencyScore::new(seq, dimensions)
    }

    fn stage_with_bounds(min: u8, max: u8, start: u8) -> StageConfig {
        let mut stage = StageConfig::technical();
        stage.min_tier = DifficultyTier(min);
        stage.max_tier = DifficultyTier(max);
        stage.start_tier = DifficultyTier(start);
        stage
    }

    fn controller(min: u8, max: u8, start: u8) -> DifficultyController {
        DifficultyController::new(DifficultyConfig::default(), &stage_with_bounds(min, max, start))
    }

    #[test]
    fn test_three_high_scores_escalate_one_step() {
        let mut c = controller(1, 5, 3);
        c.update(&score(1, 90));
        c.update(&score(2, 90));
        assert_eq!(c.tier(), DifficultyTier(3));
        let tier = c.update(&score(3, 90));
        assert_eq!(tier, DifficultyTier(4));
    }

    #[test]
    fn test_three_low_scores_deescalate_one_step() {
        let mut c = controller(1, 5, 3);
        for seq in 1..=3 {
            c.update(&score(seq, 20));
        }
        assert_eq!(c.tier(), DifficultyTier(2));
    }

    #[test]
    fn test_streak_resets_on_opposing_signal() {
        let mut c = controller(1, 5, 3);
        c.update(&score(1, 90));
        c.update(&score(2, 90));
        // one collapse drags the window average out of the high band
        c.update(&score(3, 5));
        c.update(&score(4, 90));
        c.update(&score(5, 90));
        // never three consecutive qualifying averages in either direction
        assert_eq!(c.tier(), DifficultyTier(3));
    }

    #[test]
    fn test_mid_band_average_resets_both_streaks() {
        let mut c = controller(1, 5, 3);
        c.update(&score(1, 90));
        c.update(&score(2, 90));
        c.update(&score(3, 30)); // window avg 70: neither band
        c.update(&score(4, 90));
        c.update(&score(5, 90));
        assert_eq!(c.tier(), DifficultyTier(3));
    }

    #[test]
    fn test_escalation_clamped_at_stage_maximum() {
        let mut c = controller(1, 4, 4);
        for seq in 1..=9 {
            c.update(&score(seq, 95));
        }
        assert_eq!(c.tier(), DifficultyTier(4));
    }

    #[test]
    fn test_deescalation_clamped_at_stage_minimum() {
        let mut c = controller(2, 5, 2);
        for seq in 1..=9 {
            c.update(&score(seq, 5));
        }
        assert_eq!(c.tier(), DifficultyTier(2));
    }

    #[test]
    fn test_sustained_high_streak_climbs_step_by_step() {
        let mut c = controller(1, 5, 2);
        for seq in 1..=6 {
            c.update(&score(seq, 95));
        }
        // two full streaks of three -> two escalations
        assert_eq!(c.tier(), DifficultyTier(4));
    }

    #[test]
    fn test_enter_stage_reclamps_and_resets_streaks() {
        let mut c = controller(1, 5, 3);
        c.update(&score(1, 90));
        c.update(&score(2, 90));
        c.update(&score(3, 90));
        assert_eq!(c.tier(), DifficultyTier(4));

        c.enter_stage(&stage_with_bounds(1, 3, 2));
        assert_eq!(c.tier(), DifficultyTier(3));
        assert_eq!(c.state().escalate_streak, 0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The tier never leaves the stage bounds, for any score
            /// sequence including all-high and all-low streaks.
            #[test]
            fn tier_stays_within_bounds(
                scores in prop::collection::vec(0u8..=100, 0..60),
                min in 1u8..=4,
                span in 0u8..=3,
                start_offset in 0u8..=3,
            ) {
                let max = (min + span).min(5);
                let start = (min + start_offset).min(max);
                let mut c = controller(min, max, start);
                for (i, s) in scores.iter().enumerate() {
                    let tier = c.update(&score(i as u64 + 1, *s));
                    prop_assert!(tier >= DifficultyTier(min));
                    prop_assert!(tier <= DifficultyTier(max));
                }
            }

            /// Tier moves at most one step per update.
            #[test]
            fn tier_moves_one_step_at_a_time(
                scores in prop::collection::vec(0u8..=100, 0..60),
            ) {
                let mut c = controller(1, 5, 3);
                let mut previous = c.tier().value();
                for (i, s) in scores.iter().enumerate() {
                    let tier = c.update(&score(i as u64 + 1, *s)).value();
                    prop_assert!(tier.abs_diff(previous) <= 1);
                    previous = tier;
                }
            }
        }
    }
}
