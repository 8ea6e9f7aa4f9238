//! Timed challenge scoring.
//!
//! Pure functions blending completion, speed and accuracy into a 0-100 score,
//! a time bonus for fast finishes, and the urgency classification shared by
//! the countdown and the pressure indicator.
//!
//! | Ratio (time used / limit) | Speed score (completed) |
//! |---------------------------|-------------------------|
//! | ≤ 0.5                     | 100                     |
//! | 0.5 .. 1.0                | 100 - (ratio - 0.5) * 60 |
//! | ≥ 1.0                     | 70                      |
//!
//! A zero time limit is treated as a fully consumed budget (ratio 1.0).

use serde::{Deserialize, Serialize};

/// Relative weights of the three score components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringWeights {
    pub completion: f64,
    pub speed: f64,
    pub accuracy: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            completion: 0.4,
            speed: 0.4,
            accuracy: 0.2,
        }
    }
}

impl ScoringWeights {
    /// Scale the weights to sum to 1.0. Negative weights count as zero;
    /// an all-zero set falls back to the defaults.
    pub fn normalized(&self) -> Self {
        let completion = self.completion.max(0.0);
        let speed = self.speed.max(0.0);
        let accuracy = self.accuracy.max(0.0);
        let sum = completion + speed + accuracy;
        if !sum.is_finite() || sum <= 0.0 {
            return Self::default();
        }
        Self {
            completion: completion / sum,
            speed: speed / sum,
            accuracy: accuracy / sum,
        }
    }
}

/// Input to [`calculate_timer_score`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInput {
    /// Time limit in seconds.
    pub time_limit: u32,
    /// Seconds actually used.
    pub time_used: f64,
    /// 0.0 ..= 1.0
    pub accuracy: f64,
    pub completed: bool,
    pub weights: ScoringWeights,
}

impl ScoreInput {
    pub fn new(time_limit: u32, time_used: f64, accuracy: f64, completed: bool) -> Self {
        Self {
            time_limit,
            time_used,
            accuracy,
            completed,
            weights: ScoringWeights::default(),
        }
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }
}

/// Score breakdown for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    pub completion_score: u32,
    pub speed_score: u32,
    pub accuracy_score: u32,
    pub total_score: u32,
    pub time_used: f64,
    pub time_limit: u32,
    pub completed: bool,
    pub weights: ScoringWeights,
}

/// Bonus awarded for finishing well inside the time limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BonusResult {
    pub had_bonus: bool,
    pub bonus_points: u32,
    /// 0 ..= 30
    pub bonus_percentage: u32,
    pub final_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Normal,
    Warning,
    Critical,
}

impl UrgencyLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            UrgencyLevel::Normal => "normal",
            UrgencyLevel::Warning => "warning",
            UrgencyLevel::Critical => "critical",
        }
    }
}

/// Percentage thresholds at or below which urgency escalates.
pub const WARNING_PERCENT: u32 = 30;
pub const CRITICAL_PERCENT: u32 = 10;

fn time_ratio(time_limit: u32, time_used: f64) -> f64 {
    if time_limit == 0 {
        return 1.0;
    }
    (time_used.max(0.0)) / time_limit as f64
}

fn round_score(value: f64) -> u32 {
    value.round().clamp(0.0, u32::MAX as f64) as u32
}

pub fn calculate_timer_score(input: ScoreInput) -> ScoreResult {
    let weights = input.weights.normalized();
    let ratio = time_ratio(input.time_limit, input.time_used);

    let completion_score = if input.completed {
        100
    } else {
        round_score(ratio * 100.0).min(50)
    };

    let speed_score = if input.completed {
        if ratio <= 0.5 {
            100
        } else if ratio >= 1.0 {
            70
        } else {
            round_score(100.0 - (ratio - 0.5) * 60.0)
        }
    } else {
        round_score(50.0 - ratio * 50.0)
    };

    let accuracy_score = round_score(input.accuracy.clamp(0.0, 1.0) * 100.0);

    let weighted = completion_score as f64 * weights.completion
        + speed_score as f64 * weights.speed
        + accuracy_score as f64 * weights.accuracy;
    let total_score = round_score(weighted).min(100);

    ScoreResult {
        completion_score,
        speed_score,
        accuracy_score,
        total_score,
        time_used: input.time_used,
        time_limit: input.time_limit,
        completed: input.completed,
        weights,
    }
}

pub fn calculate_time_bonus(time_limit: u32, time_used: f64, base_score: u32) -> BonusResult {
    let ratio = time_ratio(time_limit, time_used);
    if ratio > 0.7 {
        return BonusResult {
            had_bonus: false,
            bonus_points: 0,
            bonus_percentage: 0,
            final_score: base_score,
        };
    }

    let bonus_percentage = if ratio <= 0.4 {
        30
    } else {
        round_score((0.7 - ratio) * 100.0).min(30)
    };
    let bonus_points = round_score(base_score as f64 * bonus_percentage as f64 / 100.0);

    BonusResult {
        had_bonus: true,
        bonus_points,
        bonus_percentage,
        final_score: base_score + bonus_points,
    }
}

/// Remaining-time percentage, clamped to 0..=100. Zero total counts as 0%.
pub fn remaining_percentage(time_left: u32, total_time: u32) -> f64 {
    if total_time == 0 {
        return 0.0;
    }
    (time_left as f64 / total_time as f64 * 100.0).clamp(0.0, 100.0)
}

/// True when `time_left / total_time * 100 <= percent`, computed exactly.
pub(crate) fn at_or_below_percent(time_left: u32, total_time: u32, percent: u32) -> bool {
    (time_left as u64) * 100 <= (percent as u64) * (total_time as u64)
}

/// A zero total is always critical, matching its 0% remaining.
pub fn calculate_urgency_level(time_left: u32, total_time: u32) -> UrgencyLevel {
    urgency_level_with(time_left, total_time, WARNING_PERCENT, CRITICAL_PERCENT)
}

/// Urgency against custom warning/critical percentages.
pub fn urgency_level_with(
    time_left: u32,
    total_time: u32,
    warning_percent: u32,
    critical_percent: u32,
) -> UrgencyLevel {
    if total_time == 0 || at_or_below_percent(time_left, total_time, critical_percent) {
        UrgencyLevel::Critical
    } else if at_or_below_percent(time_left, total_time, warning_percent) {
        UrgencyLevel::Warning
    } else {
        UrgencyLevel::Normal
    }
}
