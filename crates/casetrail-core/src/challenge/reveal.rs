//! Staged result reveal.
//!
//! ```text
//! Pending ─(reveal delay)─> Visible ─(details delay)─> Details
//!    ─(continue | auto-continue)─> Acknowledged ─(complete delay)─> Complete
//! ```
//!
//! `Complete` is reported exactly once.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::scoring::{BonusResult, ScoreResult};
use crate::clock::{OneShot, SharedClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealConfig {
    #[serde(default = "default_reveal_delay")]
    pub reveal_delay_ms: u64,
    #[serde(default = "default_details_delay")]
    pub details_delay_ms: u64,
    #[serde(default = "default_complete_delay")]
    pub complete_delay_ms: u64,
    /// Continue without acknowledgment this long after details are shown.
    #[serde(default)]
    pub auto_continue_ms: Option<u64>,
}

fn default_reveal_delay() -> u64 {
    500
}
fn default_details_delay() -> u64 {
    1_000
}
fn default_complete_delay() -> u64 {
    500
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            reveal_delay_ms: default_reveal_delay(),
            details_delay_ms: default_details_delay(),
            complete_delay_ms: default_complete_delay(),
            auto_continue_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealStage {
    Pending,
    Visible,
    Details,
    Acknowledged,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealEvent {
    Shown,
    DetailsRevealed,
    Continued,
    AnimationComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Excellent,
    Great,
    Good,
    NeedsPractice,
}

impl PerformanceTier {
    pub fn from_score(total_score: u32) -> Self {
        match total_score {
            90.. => PerformanceTier::Excellent,
            75..=89 => PerformanceTier::Great,
            60..=74 => PerformanceTier::Good,
            _ => PerformanceTier::NeedsPractice,
        }
    }

    pub fn headline(self, completed: bool) -> &'static str {
        if !completed {
            return "Time's up!";
        }
        match self {
            PerformanceTier::Excellent => "Outstanding work!",
            PerformanceTier::Great => "Great job!",
            PerformanceTier::Good => "Good effort!",
            PerformanceTier::NeedsPractice => "Keep practicing!",
        }
    }
}

/// Read-only projection of the attempt's scores. Missing data renders as zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSummary {
    pub completed: bool,
    pub total_score: u32,
    pub completion_score: u32,
    pub speed_score: u32,
    pub accuracy_score: u32,
    pub time_used: f64,
    pub time_limit: u32,
    pub bonus_points: u32,
    pub bonus_percentage: u32,
    pub final_score: u32,
    pub tier: PerformanceTier,
    pub headline: String,
}

impl ResultSummary {
    pub fn new(score: Option<&ScoreResult>, bonus: Option<&BonusResult>) -> Self {
        let completed = score.map(|s| s.completed).unwrap_or(false);
        let total_score = score.map(|s| s.total_score).unwrap_or(0);
        let tier = PerformanceTier::from_score(total_score);
        Self {
            completed,
            total_score,
            completion_score: score.map(|s| s.completion_score).unwrap_or(0),
            speed_score: score.map(|s| s.speed_score).unwrap_or(0),
            accuracy_score: score.map(|s| s.accuracy_score).unwrap_or(0),
            time_used: score.map(|s| s.time_used).unwrap_or(0.0),
            time_limit: score.map(|s| s.time_limit).unwrap_or(0),
            bonus_points: bonus.map(|b| b.bonus_points).unwrap_or(0),
            bonus_percentage: bonus.map(|b| b.bonus_percentage).unwrap_or(0),
            final_score: bonus.map(|b| b.final_score).unwrap_or(total_score),
            tier,
            headline: tier.headline(completed).to_string(),
        }
    }
}

#[derive(Debug)]
pub struct TimerResultAnimation {
    config: RevealConfig,
    clock: SharedClock,
    stage: RevealStage,
    summary: ResultSummary,
    next: OneShot,
}

impl TimerResultAnimation {
    /// Mount the reveal; the first stage is scheduled immediately.
    pub fn new(
        score: Option<&ScoreResult>,
        bonus: Option<&BonusResult>,
        config: RevealConfig,
        clock: SharedClock,
    ) -> Self {
        let mut next = OneShot::new();
        next.arm(clock.now_ms(), config.reveal_delay_ms);
        Self {
            config,
            clock,
            stage: RevealStage::Pending,
            summary: ResultSummary::new(score, bonus),
            next,
        }
    }

    pub fn stage(&self) -> RevealStage {
        self.stage
    }

    pub fn summary(&self) -> &ResultSummary {
        &self.summary
    }

    pub fn is_visible(&self) -> bool {
        self.stage != RevealStage::Pending
    }

    pub fn details_visible(&self) -> bool {
        matches!(
            self.stage,
            RevealStage::Details | RevealStage::Acknowledged | RevealStage::Complete
        )
    }

    pub fn is_complete(&self) -> bool {
        self.stage == RevealStage::Complete
    }

    /// The "continue" acknowledgment. Ignored before the reveal is visible
    /// or after it was already acknowledged.
    pub fn acknowledge(&mut self) -> Option<RevealEvent> {
        let now = self.clock.now_ms();
        self.continue_from(now)
    }

    fn continue_from(&mut self, at_ms: u64) -> Option<RevealEvent> {
        if !matches!(self.stage, RevealStage::Visible | RevealStage::Details) {
            return None;
        }
        self.stage = RevealStage::Acknowledged;
        self.next.arm(at_ms, self.config.complete_delay_ms);
        Some(RevealEvent::Continued)
    }

    /// Advance through every stage whose delay has elapsed. Each stage is
    /// scheduled from the previous deadline, so a late poll catches up.
    pub fn poll(&mut self) -> Vec<RevealEvent> {
        let mut events = Vec::new();
        let now = self.clock.now_ms();
        while let Some(due) = self.next.deadline_ms() {
            if !self.next.fire_if_due(now) {
                break;
            }
            match self.stage {
                RevealStage::Pending => {
                    self.stage = RevealStage::Visible;
                    self.next.arm(due, self.config.details_delay_ms);
                    events.push(RevealEvent::Shown);
                }
                RevealStage::Visible => {
                    self.stage = RevealStage::Details;
                    if let Some(auto) = self.config.auto_continue_ms {
                        self.next.arm(due, auto);
                    }
                    events.push(RevealEvent::DetailsRevealed);
                }
                RevealStage::Details => {
                    events.extend(self.continue_from(due));
                }
                RevealStage::Acknowledged => {
                    self.stage = RevealStage::Complete;
                    debug!(total_score = self.summary.total_score, "result reveal complete");
                    events.push(RevealEvent::AnimationComplete);
                }
                RevealStage::Complete => {}
            }
        }
        events
    }
}
