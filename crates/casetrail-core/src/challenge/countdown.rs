//! Countdown timer state machine.
//!
//! The timer decrements one second per elapsed interval of its tick source.
//! It does not use internal threads - the caller is responsible for calling
//! `pump()` periodically (or `tick()` to single-step).
//!
//! ## Threshold callbacks
//!
//! ```text
//! duration ── tick ──> ... ≤ warning% ──> ... ≤ critical% ──> 0
//!                           Warning         Critical        Completed
//! ```
//!
//! Warning and critical are latched: each fires at most once per run and
//! only `reset()` clears the latches. `add_time()` never un-latches them.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::scoring::{
    at_or_below_percent, remaining_percentage, urgency_level_with, UrgencyLevel, CRITICAL_PERCENT,
    WARNING_PERCENT,
};
use crate::clock::{Interval, SharedClock};
use crate::error::ValidationError;

const TICK_MS: u64 = 1_000;

/// Construction parameters for a [`CountdownTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerConfig {
    duration: u32,
    auto_start: bool,
    warning_threshold: u32,
    critical_threshold: u32,
}

impl TimerConfig {
    /// A timer of `duration` seconds with default thresholds (30% / 10%).
    ///
    /// # Errors
    /// Returns an error if `duration` is zero.
    pub fn new(duration: u32) -> Result<Self, ValidationError> {
        if duration == 0 {
            return Err(ValidationError::invalid("duration", "must be greater than zero"));
        }
        Ok(Self {
            duration,
            auto_start: true,
            warning_threshold: WARNING_PERCENT,
            critical_threshold: CRITICAL_PERCENT,
        })
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Override the warning/critical percentages.
    ///
    /// # Errors
    /// Returns an error unless `critical <= warning <= 100`.
    pub fn with_thresholds(mut self, warning: u32, critical: u32) -> Result<Self, ValidationError> {
        if warning > 100 || critical > warning {
            return Err(ValidationError::invalid(
                "thresholds",
                format!(
                    "expected critical <= warning <= 100, got warning={warning} critical={critical}"
                ),
            ));
        }
        self.warning_threshold = warning;
        self.critical_threshold = critical;
        Ok(self)
    }

    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn auto_start(&self) -> bool {
        self.auto_start
    }

    pub fn warning_threshold(&self) -> u32 {
        self.warning_threshold
    }

    pub fn critical_threshold(&self) -> u32 {
        self.critical_threshold
    }
}

/// Every timer state change produces an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerEvent {
    Started { time_left: u32 },
    Paused { time_left: u32 },
    Reset { time_left: u32 },
    TimeAdded { added: u32, time_left: u32 },
    Tick { time_left: u32, elapsed: u32 },
    Warning { time_left: u32 },
    Critical { time_left: u32 },
    Completed,
}

/// Observer for timer callbacks. All methods default to no-ops.
pub trait TimerListener {
    fn on_tick(&mut self, _time_left: u32, _elapsed: u32) {}
    fn on_warning(&mut self, _time_left: u32) {}
    fn on_critical(&mut self, _time_left: u32) {}
    fn on_complete(&mut self) {}
}

/// Serializable view of the timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub time_left: u32,
    pub duration: u32,
    pub elapsed: u32,
    pub percentage: f64,
    pub urgency: UrgencyLevel,
    pub is_running: bool,
    pub has_warned: bool,
    pub has_critical_warned: bool,
    pub formatted: String,
}

pub struct CountdownTimer {
    config: TimerConfig,
    time_left: u32,
    is_running: bool,
    has_warned: bool,
    has_critical_warned: bool,
    interval: Interval,
    clock: SharedClock,
    listener: Option<Box<dyn TimerListener>>,
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("config", &self.config)
            .field("time_left", &self.time_left)
            .field("is_running", &self.is_running)
            .field("has_warned", &self.has_warned)
            .field("has_critical_warned", &self.has_critical_warned)
            .finish_non_exhaustive()
    }
}

impl CountdownTimer {
    /// Create a timer; starts immediately when `auto_start` is set.
    pub fn new(config: TimerConfig, clock: SharedClock) -> Self {
        let mut timer = Self {
            config,
            time_left: config.duration,
            is_running: false,
            has_warned: false,
            has_critical_warned: false,
            interval: Interval::new(TICK_MS),
            clock,
            listener: None,
        };
        if config.auto_start {
            timer.start();
        }
        timer
    }

    pub fn with_listener(mut self, listener: Box<dyn TimerListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn set_listener(&mut self, listener: Box<dyn TimerListener>) {
        self.listener = Some(listener);
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    pub fn time_left(&self) -> u32 {
        self.time_left
    }

    pub fn duration(&self) -> u32 {
        self.config.duration
    }

    pub fn elapsed(&self) -> u32 {
        self.config.duration.saturating_sub(self.time_left)
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn has_warned(&self) -> bool {
        self.has_warned
    }

    pub fn has_critical_warned(&self) -> bool {
        self.has_critical_warned
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            time_left: self.time_left,
            duration: self.config.duration,
            elapsed: self.elapsed(),
            percentage: remaining_percentage(self.time_left, self.config.duration),
            urgency: urgency_level_with(
                self.time_left,
                self.config.duration,
                self.config.warning_threshold,
                self.config.critical_threshold,
            ),
            is_running: self.is_running,
            has_warned: self.has_warned,
            has_critical_warned: self.has_critical_warned,
            formatted: format_clock(self.time_left),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// No-op when already running or when no time is left.
    pub fn start(&mut self) -> Option<TimerEvent> {
        if self.is_running || self.time_left == 0 {
            return None;
        }
        self.is_running = true;
        self.interval.arm(self.clock.now_ms());
        debug!(time_left = self.time_left, "countdown started");
        Some(TimerEvent::Started {
            time_left: self.time_left,
        })
    }

    /// Stop ticking without touching time left or latches.
    pub fn pause(&mut self) -> Option<TimerEvent> {
        if !self.is_running {
            return None;
        }
        self.is_running = false;
        self.interval.cancel();
        debug!(time_left = self.time_left, "countdown paused");
        Some(TimerEvent::Paused {
            time_left: self.time_left,
        })
    }

    /// Restore the full duration, clear latches, and re-arm auto-start.
    pub fn reset(&mut self) -> Vec<TimerEvent> {
        self.interval.cancel();
        self.is_running = false;
        self.time_left = self.config.duration;
        self.has_warned = false;
        self.has_critical_warned = false;
        let mut events = vec![TimerEvent::Reset {
            time_left: self.time_left,
        }];
        if self.config.auto_start {
            events.extend(self.start());
        }
        events
    }

    /// Give back up to `seconds`, capped at the duration.
    pub fn add_time(&mut self, seconds: u32) -> TimerEvent {
        let before = self.time_left;
        self.time_left = self
            .time_left
            .saturating_add(seconds)
            .min(self.config.duration);
        TimerEvent::TimeAdded {
            added: self.time_left - before,
            time_left: self.time_left,
        }
    }

    /// Process every whole second elapsed on the tick source since the last pump.
    pub fn pump(&mut self) -> Vec<TimerEvent> {
        let due = self.interval.take_due(self.clock.now_ms());
        let mut events = Vec::new();
        for _ in 0..due {
            if !self.is_running {
                break;
            }
            events.extend(self.tick());
        }
        events
    }

    /// Advance exactly one second. Does nothing while stopped.
    pub fn tick(&mut self) -> Vec<TimerEvent> {
        if !self.is_running || self.time_left == 0 {
            return Vec::new();
        }

        self.time_left -= 1;
        let elapsed = self.elapsed();
        trace!(time_left = self.time_left, elapsed, "countdown tick");

        let mut events = vec![TimerEvent::Tick {
            time_left: self.time_left,
            elapsed,
        }];

        let duration = self.config.duration;
        let in_critical =
            at_or_below_percent(self.time_left, duration, self.config.critical_threshold);
        let in_warning =
            at_or_below_percent(self.time_left, duration, self.config.warning_threshold);

        if in_critical && !self.has_critical_warned {
            self.has_critical_warned = true;
            debug!(time_left = self.time_left, "countdown critical");
            events.push(TimerEvent::Critical {
                time_left: self.time_left,
            });
        } else if in_warning && !in_critical && !self.has_warned {
            self.has_warned = true;
            debug!(time_left = self.time_left, "countdown warning");
            events.push(TimerEvent::Warning {
                time_left: self.time_left,
            });
        }

        if self.time_left == 0 {
            self.is_running = false;
            self.interval.cancel();
            debug!("countdown complete");
            events.push(TimerEvent::Completed);
        }

        self.notify(&events);
        events
    }

    fn notify(&mut self, events: &[TimerEvent]) {
        let Some(listener) = self.listener.as_mut() else {
            return;
        };
        for event in events {
            match *event {
                TimerEvent::Tick { time_left, elapsed } => listener.on_tick(time_left, elapsed),
                TimerEvent::Warning { time_left } => listener.on_warning(time_left),
                TimerEvent::Critical { time_left } => listener.on_critical(time_left),
                TimerEvent::Completed => listener.on_complete(),
                _ => {}
            }
        }
    }
}

/// Render seconds as `M:SS`.
pub fn format_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        warnings: Vec<u32>,
        criticals: Vec<u32>,
        completions: u32,
        ticks: u32,
    }

    struct Recorder(Arc<Mutex<Recorded>>);

    impl TimerListener for Recorder {
        fn on_tick(&mut self, _time_left: u32, _elapsed: u32) {
            self.0.lock().unwrap().ticks += 1;
        }
        fn on_warning(&mut self, time_left: u32) {
            self.0.lock().unwrap().warnings.push(time_left);
        }
        fn on_critical(&mut self, time_left: u32) {
            self.0.lock().unwrap().criticals.push(time_left);
        }
        fn on_complete(&mut self) {
            self.0.lock().unwrap().completions += 1;
        }
    }

    fn timer_with_recorder(duration: u32) -> (VirtualClock, CountdownTimer, Arc<Mutex<Recorded>>) {
        let clock = VirtualClock::new();
        let record = Arc::new(Mutex::new(Recorded::default()));
        let timer = CountdownTimer::new(TimerConfig::new(duration).unwrap(), clock.shared())
            .with_listener(Box::new(Recorder(record.clone())));
        (clock, timer, record)
    }

    #[test]
    fn ten_second_countdown_fires_each_threshold_once() {
        let (clock, mut timer, record) = timer_with_recorder(10);
        assert!(timer.is_running());

        clock.advance_secs(7);
        timer.pump();
        assert_eq!(record.lock().unwrap().warnings, vec![3]);
        assert!(record.lock().unwrap().criticals.is_empty());

        clock.advance_secs(2);
        timer.pump();
        assert_eq!(record.lock().unwrap().criticals, vec![1]);

        clock.advance_secs(1);
        timer.pump();
        let rec = record.lock().unwrap();
        assert_eq!(rec.completions, 1);
        assert_eq!(rec.ticks, 10);
        assert_eq!(rec.warnings.len(), 1);
        assert_eq!(rec.criticals.len(), 1);
        drop(rec);

        assert_eq!(timer.time_left(), 0);
        assert!(!timer.is_running());

        clock.advance_secs(5);
        assert!(timer.pump().is_empty());
        assert_eq!(record.lock().unwrap().completions, 1);
    }

    #[test]
    fn start_is_noop_when_running_or_exhausted() {
        let clock = VirtualClock::new();
        let mut timer = CountdownTimer::new(TimerConfig::new(2).unwrap(), clock.shared());
        assert!(timer.start().is_none());
        clock.advance_secs(2);
        timer.pump();
        assert_eq!(timer.time_left(), 0);
        assert!(timer.start().is_none());
    }

    #[test]
    fn pause_holds_time_and_latches() {
        let clock = VirtualClock::new();
        let mut timer = CountdownTimer::new(TimerConfig::new(10).unwrap(), clock.shared());
        clock.advance_secs(8);
        timer.pump();
        assert!(timer.has_warned());

        assert!(timer.pause().is_some());
        clock.advance_secs(30);
        assert!(timer.pump().is_empty());
        assert_eq!(timer.time_left(), 2);
        assert!(timer.has_warned());

        timer.start();
        clock.advance_secs(1);
        let events = timer.pump();
        assert!(events.contains(&TimerEvent::Critical { time_left: 1 }));
    }

    #[test]
    fn reset_restores_duration_and_rearms_auto_start() {
        let clock = VirtualClock::new();
        let mut timer = CountdownTimer::new(TimerConfig::new(10).unwrap(), clock.shared());
        clock.advance_secs(9);
        timer.pump();
        assert!(timer.has_critical_warned());

        let events = timer.reset();
        assert_eq!(events[0], TimerEvent::Reset { time_left: 10 });
        assert!(matches!(events[1], TimerEvent::Started { .. }));
        assert_eq!(timer.time_left(), 10);
        assert!(!timer.has_warned());
        assert!(!timer.has_critical_warned());
        assert!(timer.is_running());
    }

    #[test]
    fn reset_without_auto_start_stays_stopped() {
        let clock = VirtualClock::new();
        let config = TimerConfig::new(10).unwrap().with_auto_start(false);
        let mut timer = CountdownTimer::new(config, clock.shared());
        assert!(!timer.is_running());
        timer.start();
        timer.reset();
        assert!(!timer.is_running());
    }

    #[test]
    fn add_time_is_capped_and_keeps_latches() {
        let clock = VirtualClock::new();
        let mut timer = CountdownTimer::new(TimerConfig::new(10).unwrap(), clock.shared());
        clock.advance_secs(8);
        timer.pump();
        assert!(timer.has_warned());

        let event = timer.add_time(60);
        assert_eq!(event, TimerEvent::TimeAdded { added: 8, time_left: 10 });
        assert!(timer.has_warned());

        clock.advance_secs(7);
        let events = timer.pump();
        assert!(!events.iter().any(|e| matches!(e, TimerEvent::Warning { .. })));
    }

    #[test]
    fn jumping_past_warning_fires_only_critical() {
        let clock = VirtualClock::new();
        let mut timer = CountdownTimer::new(TimerConfig::new(2).unwrap(), clock.shared());
        clock.advance_secs(2);
        let events = timer.pump();
        assert_eq!(
            events,
            vec![
                TimerEvent::Tick { time_left: 1, elapsed: 1 },
                TimerEvent::Tick { time_left: 0, elapsed: 2 },
                TimerEvent::Critical { time_left: 0 },
                TimerEvent::Completed,
            ]
        );
    }

    #[test]
    fn zero_duration_is_rejected() {
        assert!(TimerConfig::new(0).is_err());
        assert!(TimerConfig::new(10).unwrap().with_thresholds(5, 20).is_err());
    }

    #[test]
    fn format_clock_pads_seconds() {
        assert_eq!(format_clock(0), "0:00");
        assert_eq!(format_clock(65), "1:05");
        assert_eq!(format_clock(600), "10:00");
    }
}
