//! Time pressure indicator.
//!
//! Derives urgency from `(time_left, total_time)` against the same
//! percentages the countdown uses, and reports *transitions* only. Warning
//! and critical transitions raise an alert message that is dismissed by a
//! one-shot deadline after [`ALERT_DISMISS_MS`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::countdown::format_clock;
use super::scoring::{
    remaining_percentage, urgency_level_with, UrgencyLevel, CRITICAL_PERCENT, WARNING_PERCENT,
};
use crate::clock::{OneShot, SharedClock};

pub const ALERT_DISMISS_MS: u64 = 3_000;

/// Raised once per urgency transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrgencyChange {
    pub level: UrgencyLevel,
    pub time_left: u32,
    pub total_time: u32,
    pub percentage: f64,
    /// Empty for `normal`.
    pub message: String,
}

/// What a renderer needs to draw the indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorView {
    pub level: UrgencyLevel,
    pub percentage: f64,
    pub formatted: String,
    pub alert: Option<String>,
}

pub fn alert_message(level: UrgencyLevel, time_left: u32) -> String {
    match level {
        UrgencyLevel::Normal => String::new(),
        UrgencyLevel::Warning => {
            format!("Time is running low: {} remaining", format_clock(time_left))
        }
        UrgencyLevel::Critical => format!("Hurry! Only {} left", format_clock(time_left)),
    }
}

#[derive(Debug)]
pub struct TimePressureIndicator {
    clock: SharedClock,
    dismiss_after_ms: u64,
    warning_percent: u32,
    critical_percent: u32,
    last_level: UrgencyLevel,
    time_left: u32,
    total_time: u32,
    alert: Option<String>,
    dismiss: OneShot,
}

impl TimePressureIndicator {
    pub fn new(total_time: u32, clock: SharedClock) -> Self {
        Self {
            clock,
            dismiss_after_ms: ALERT_DISMISS_MS,
            warning_percent: WARNING_PERCENT,
            critical_percent: CRITICAL_PERCENT,
            last_level: UrgencyLevel::Normal,
            time_left: total_time,
            total_time,
            alert: None,
            dismiss: OneShot::new(),
        }
    }

    pub fn with_dismiss_after(mut self, ms: u64) -> Self {
        self.dismiss_after_ms = ms;
        self
    }

    pub fn with_thresholds(mut self, warning_percent: u32, critical_percent: u32) -> Self {
        self.warning_percent = warning_percent;
        self.critical_percent = critical_percent;
        self
    }

    pub fn level(&self) -> UrgencyLevel {
        self.last_level
    }

    /// Percentage of time remaining, clamped to 0..=100.
    pub fn percentage(&self) -> f64 {
        remaining_percentage(self.time_left, self.total_time)
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn view(&self) -> IndicatorView {
        IndicatorView {
            level: self.last_level,
            percentage: self.percentage(),
            formatted: format_clock(self.time_left),
            alert: self.alert.clone(),
        }
    }

    /// Feed the latest reading. Returns a change only when the level moved.
    pub fn update(&mut self, time_left: u32, total_time: u32) -> Option<UrgencyChange> {
        self.time_left = time_left;
        self.total_time = total_time;

        let level =
            urgency_level_with(time_left, total_time, self.warning_percent, self.critical_percent);
        if level == self.last_level {
            return None;
        }
        self.last_level = level;

        let message = alert_message(level, time_left);
        if message.is_empty() {
            self.alert = None;
            self.dismiss.cancel();
        } else {
            self.alert = Some(message.clone());
            self.dismiss.arm(self.clock.now_ms(), self.dismiss_after_ms);
        }

        debug!(level = level.as_str(), time_left, total_time, "urgency changed");
        Some(UrgencyChange {
            level,
            time_left,
            total_time,
            percentage: self.percentage(),
            message,
        })
    }

    /// Dismiss the alert once its display time has passed. Returns true on dismissal.
    pub fn poll(&mut self) -> bool {
        if self.dismiss.fire_if_due(self.clock.now_ms()) {
            self.alert = None;
            return true;
        }
        false
    }

    pub fn reset(&mut self, total_time: u32) {
        self.last_level = UrgencyLevel::Normal;
        self.time_left = total_time;
        self.total_time = total_time;
        self.alert = None;
        self.dismiss.cancel();
    }
}
