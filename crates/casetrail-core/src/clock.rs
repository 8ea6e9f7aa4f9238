//! Time sources and cancellable schedules.
//!
//! Nothing in this crate spawns threads. Time-driven components arm an
//! [`Interval`] or [`OneShot`] against a [`TickSource`] and the caller is
//! responsible for pumping them periodically, the same way a GUI event loop
//! would drive a `setInterval` callback.
//!
//! ## Usage
//!
//! ```ignore
//! let clock = VirtualClock::new();
//! let mut every_second = Interval::new(1_000);
//! every_second.arm(clock.now_ms());
//! clock.advance(3_500);
//! assert_eq!(every_second.take_due(clock.now_ms()), 3);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond source.
pub trait TickSource: fmt::Debug + Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Shared handle to a tick source.
pub type SharedClock = Arc<dyn TickSource>;

/// Wall clock backed by `Instant`, measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now: Arc<AtomicU64>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(secs.saturating_mul(1_000));
    }

    pub fn shared(&self) -> SharedClock {
        Arc::new(self.clone())
    }
}

impl TickSource for VirtualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Periodic schedule. Cancelling disarms it until the next `arm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interval {
    period_ms: u64,
    next_due_ms: Option<u64>,
}

impl Interval {
    pub fn new(period_ms: u64) -> Self {
        Self {
            period_ms: period_ms.max(1),
            next_due_ms: None,
        }
    }

    pub fn period_ms(&self) -> u64 {
        self.period_ms
    }

    pub fn is_armed(&self) -> bool {
        self.next_due_ms.is_some()
    }

    /// Arm the schedule so the first period elapses one interval after `now_ms`.
    pub fn arm(&mut self, now_ms: u64) {
        self.next_due_ms = Some(now_ms.saturating_add(self.period_ms));
    }

    pub fn cancel(&mut self) {
        self.next_due_ms = None;
    }

    /// Number of whole periods that elapsed up to `now_ms`, consuming them.
    pub fn take_due(&mut self, now_ms: u64) -> u64 {
        let Some(next) = self.next_due_ms else {
            return 0;
        };
        if now_ms < next {
            return 0;
        }
        let count = (now_ms - next) / self.period_ms + 1;
        self.next_due_ms = Some(next + count * self.period_ms);
        count
    }
}

/// Single deadline. Fires at most once per arming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OneShot {
    deadline_ms: Option<u64>,
}

impl OneShot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arm(&mut self, now_ms: u64, delay_ms: u64) {
        self.deadline_ms = Some(now_ms.saturating_add(delay_ms));
    }

    pub fn cancel(&mut self) {
        self.deadline_ms = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    /// Returns true exactly once, on the first poll at or after the deadline.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        match self.deadline_ms {
            Some(deadline) if now_ms >= deadline => {
                self.deadline_ms = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_clones_share_time() {
        let clock = VirtualClock::new();
        let other = clock.clone();
        clock.advance(1_500);
        assert_eq!(other.now_ms(), 1_500);
    }

    #[test]
    fn interval_drains_whole_periods() {
        let mut interval = Interval::new(1_000);
        interval.arm(0);
        assert_eq!(interval.take_due(999), 0);
        assert_eq!(interval.take_due(1_000), 1);
        assert_eq!(interval.take_due(3_500), 2);
        assert_eq!(interval.take_due(3_999), 0);
        assert_eq!(interval.take_due(4_000), 1);
    }

    #[test]
    fn cancelled_interval_never_fires() {
        let mut interval = Interval::new(1_000);
        interval.arm(0);
        interval.cancel();
        assert_eq!(interval.take_due(10_000), 0);
        assert!(!interval.is_armed());
    }

    #[test]
    fn one_shot_fires_once() {
        let mut shot = OneShot::new();
        shot.arm(100, 3_000);
        assert!(!shot.fire_if_due(3_099));
        assert!(shot.fire_if_due(3_100));
        assert!(!shot.fire_if_due(9_000));
    }
}
