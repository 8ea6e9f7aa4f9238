//! Timed challenge orchestration.
//!
//! Wires a [`CountdownTimer`], a [`TimePressureIndicator`], a challenge body
//! and a [`TimerResultAnimation`] around the challenge lifecycle:
//!
//! ```text
//! Ready ──start──> Active ──report_complete──> Completed
//!                    │
//!                    └──timer reaches 0──> Timeout
//! Completed | Timeout ──reset──> Ready
//! ```
//!
//! Exactly one of `Completed` / `Timeout` is reached per attempt and it is
//! terminal until `reset_challenge()`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::countdown::{CountdownTimer, TimerConfig, TimerEvent};
use super::pressure::{TimePressureIndicator, UrgencyChange, ALERT_DISMISS_MS};
use super::reveal::{RevealConfig, RevealEvent, TimerResultAnimation};
use super::scoring::{
    calculate_time_bonus, calculate_timer_score, BonusResult, ScoreInput, ScoreResult,
    ScoringWeights, CRITICAL_PERCENT, WARNING_PERCENT,
};
use crate::clock::SharedClock;
use crate::error::{ChallengeError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeState {
    Ready,
    Active,
    Completed,
    Timeout,
}

impl Default for ChallengeState {
    fn default() -> Self {
        ChallengeState::Ready
    }
}

impl ChallengeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChallengeState::Completed | ChallengeState::Timeout)
    }
}

/// Host-supplied construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeConfig {
    pub time_limit: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub scoring_weights: Option<ScoringWeights>,
    #[serde(default = "default_warning")]
    pub warning_threshold: u32,
    #[serde(default = "default_critical")]
    pub critical_threshold: u32,
    #[serde(default = "default_alert_dismiss")]
    pub alert_dismiss_ms: u64,
    #[serde(default)]
    pub reveal: RevealConfig,
}

fn default_warning() -> u32 {
    WARNING_PERCENT
}
fn default_critical() -> u32 {
    CRITICAL_PERCENT
}
fn default_alert_dismiss() -> u64 {
    ALERT_DISMISS_MS
}

impl ChallengeConfig {
    /// # Errors
    /// Returns an error if `time_limit` is zero.
    pub fn new(time_limit: u32, title: impl Into<String>) -> Result<Self, ValidationError> {
        if time_limit == 0 {
            return Err(ValidationError::invalid("time_limit", "must be greater than zero"));
        }
        Ok(Self {
            time_limit,
            title: title.into(),
            description: String::new(),
            auto_start: false,
            scoring_weights: None,
            warning_threshold: WARNING_PERCENT,
            critical_threshold: CRITICAL_PERCENT,
            alert_dismiss_ms: ALERT_DISMISS_MS,
            reveal: RevealConfig::default(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.scoring_weights = Some(weights);
        self
    }

    pub fn with_reveal(mut self, reveal: RevealConfig) -> Self {
        self.reveal = reveal;
        self
    }

    pub fn with_thresholds(mut self, warning: u32, critical: u32) -> Self {
        self.warning_threshold = warning;
        self.critical_threshold = critical;
        self
    }

    pub fn with_alert_dismiss(mut self, ms: u64) -> Self {
        self.alert_dismiss_ms = ms;
        self
    }

    /// # Errors
    /// Returns an error if the time limit is zero or thresholds are out of order.
    pub fn timer_config(&self) -> Result<TimerConfig, ValidationError> {
        TimerConfig::new(self.time_limit)?
            .with_auto_start(false)
            .with_thresholds(self.warning_threshold, self.critical_threshold)
    }
}

/// One entry in the attempt's append-only action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    #[serde(rename = "type")]
    pub action_type: String,
    /// Seconds since the challenge started.
    pub timestamp: f64,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Values injected into the challenge body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeContext {
    pub is_active: bool,
    pub time_left: u32,
    pub time_limit: u32,
    pub challenge_state: ChallengeState,
}

/// Success reported by the body itself.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyCompletion {
    pub accuracy: f64,
    pub data: serde_json::Value,
}

/// The scored exercise hosted by the container. A body reports success
/// either by returning it from [`ChallengeBody::take_completion`] or through
/// a host call to [`TimedChallengeContainer::report_complete`].
pub trait ChallengeBody {
    fn on_start(&mut self, _ctx: &ChallengeContext) {}
    fn on_tick(&mut self, _ctx: &ChallengeContext) {}
    fn on_finish(&mut self, _ctx: &ChallengeContext) {}

    /// Polled on every pump while the attempt is active, after elapsed
    /// ticks are applied. Consumed at most once per attempt.
    fn take_completion(&mut self) -> Option<BodyCompletion> {
        None
    }
}

/// Body that ignores every notification.
#[derive(Debug, Default)]
pub struct NoopBody;

impl ChallengeBody for NoopBody {}

/// Receives the attempt's outcome. Each result callback fires at most once per attempt.
pub trait ChallengeHost {
    fn on_complete(&mut self, _result: &FinalScore) {}
    fn on_time_up(&mut self, _result: &FinalScore) {}
    fn on_urgency_change(&mut self, _change: &UrgencyChange) {}
    fn on_animation_complete(&mut self) {}
}

/// Host that ignores every notification.
#[derive(Debug, Default)]
pub struct NoopHost;

impl ChallengeHost for NoopHost {}

/// Final result surfaced to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    pub attempt_id: Uuid,
    pub title: String,
    #[serde(flatten)]
    pub score: ScoreResult,
    /// Never computed for timeouts.
    pub bonus: Option<BonusResult>,
    /// Bonus-adjusted score, or the total when no bonus applies.
    pub final_score: u32,
    pub actions_count: usize,
    pub timed_out: bool,
    #[serde(default)]
    pub additional_data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChallengeEvent {
    Started,
    Timer { event: TimerEvent },
    Urgency { change: UrgencyChange },
    AlertDismissed,
    Completed { result: FinalScore },
    TimedOut { result: FinalScore },
    Reveal { event: RevealEvent },
    Reset,
}

pub struct TimedChallengeContainer {
    config: ChallengeConfig,
    clock: SharedClock,
    timer: CountdownTimer,
    indicator: TimePressureIndicator,
    reveal: Option<TimerResultAnimation>,
    body: Box<dyn ChallengeBody>,
    host: Box<dyn ChallengeHost>,
    state: ChallengeState,
    attempt_id: Uuid,
    started_at_ms: Option<u64>,
    paused_at_ms: Option<u64>,
    paused_total_ms: u64,
    actions: Vec<UserAction>,
    result: Option<FinalScore>,
    /// Events produced while catching up inside a command, drained by `pump`.
    backlog: Vec<ChallengeEvent>,
}

impl std::fmt::Debug for TimedChallengeContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedChallengeContainer")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("timer", &self.timer)
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

impl TimedChallengeContainer {
    /// # Errors
    /// Returns an error if the config's time limit or thresholds are invalid.
    pub fn new(
        config: ChallengeConfig,
        body: Box<dyn ChallengeBody>,
        host: Box<dyn ChallengeHost>,
        clock: SharedClock,
    ) -> Result<Self, ValidationError> {
        let timer = CountdownTimer::new(config.timer_config()?, clock.clone());
        let indicator = TimePressureIndicator::new(config.time_limit, clock.clone())
            .with_thresholds(config.warning_threshold, config.critical_threshold)
            .with_dismiss_after(config.alert_dismiss_ms);
        let mut container = Self {
            timer,
            indicator,
            reveal: None,
            body,
            host,
            state: ChallengeState::Ready,
            attempt_id: Uuid::new_v4(),
            started_at_ms: None,
            paused_at_ms: None,
            paused_total_ms: 0,
            actions: Vec::new(),
            result: None,
            backlog: Vec::new(),
            clock,
            config,
        };
        if container.config.auto_start {
            container.begin();
        }
        Ok(container)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    pub fn config(&self) -> &ChallengeConfig {
        &self.config
    }

    pub fn timer(&self) -> &CountdownTimer {
        &self.timer
    }

    pub fn indicator(&self) -> &TimePressureIndicator {
        &self.indicator
    }

    pub fn reveal(&self) -> Option<&TimerResultAnimation> {
        self.reveal.as_ref()
    }

    pub fn actions(&self) -> &[UserAction] {
        &self.actions
    }

    pub fn result(&self) -> Option<&FinalScore> {
        self.result.as_ref()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at_ms.is_some()
    }

    pub fn context(&self) -> ChallengeContext {
        ChallengeContext {
            is_active: self.state == ChallengeState::Active,
            time_left: self.timer.time_left(),
            time_limit: self.config.time_limit,
            challenge_state: self.state,
        }
    }

    /// Seconds of active (unpaused) time since the challenge started.
    pub fn elapsed_secs(&self) -> f64 {
        let Some(started) = self.started_at_ms else {
            return 0.0;
        };
        let now = self.paused_at_ms.unwrap_or_else(|| self.clock.now_ms());
        let active_ms = now
            .saturating_sub(started)
            .saturating_sub(self.paused_total_ms);
        active_ms as f64 / 1_000.0
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start_challenge(&mut self) -> Result<ChallengeEvent, ChallengeError> {
        self.require(ChallengeState::Ready, "start")?;
        self.begin();
        Ok(ChallengeEvent::Started)
    }

    fn begin(&mut self) {
        self.started_at_ms = Some(self.clock.now_ms());
        self.state = ChallengeState::Active;
        self.timer.start();
        info!(title = %self.config.title, attempt = %self.attempt_id, "challenge started");
        let ctx = self.context();
        self.body.on_start(&ctx);
    }

    pub fn track_action(
        &mut self,
        action_type: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<(), ChallengeError> {
        self.catch_up();
        self.require(ChallengeState::Active, "track an action")?;
        let action = UserAction {
            action_type: action_type.into(),
            timestamp: self.elapsed_secs(),
            data,
        };
        debug!(action = %action.action_type, at = action.timestamp, "action tracked");
        self.actions.push(action);
        Ok(())
    }

    /// Body-reported success with accuracy in 0.0..=1.0.
    ///
    /// Ticks the clock has already passed are applied first, so a report that
    /// arrives after the limit ran out finds the attempt in `Timeout`.
    pub fn report_complete(
        &mut self,
        accuracy: f64,
        additional_data: serde_json::Value,
    ) -> Result<FinalScore, ChallengeError> {
        self.catch_up();
        self.require(ChallengeState::Active, "complete")?;
        Ok(self.complete(accuracy, additional_data))
    }

    fn complete(&mut self, accuracy: f64, additional_data: serde_json::Value) -> FinalScore {
        let time_used = self.elapsed_secs().min(f64::from(self.config.time_limit));
        self.finish(ChallengeState::Completed);

        let score = calculate_timer_score(self.score_input(time_used, accuracy, true));
        let bonus = calculate_time_bonus(self.config.time_limit, time_used, score.total_score);
        let result = FinalScore {
            attempt_id: self.attempt_id,
            title: self.config.title.clone(),
            score,
            bonus: Some(bonus),
            final_score: bonus.final_score,
            actions_count: self.actions.len(),
            timed_out: false,
            additional_data,
        };
        info!(
            total = result.score.total_score,
            final_score = result.final_score,
            time_used,
            "challenge completed"
        );

        self.reveal = Some(TimerResultAnimation::new(
            Some(&result.score),
            result.bonus.as_ref(),
            self.config.reveal,
            self.clock.clone(),
        ));
        self.result = Some(result.clone());
        self.host.on_complete(&result);
        result
    }

    pub fn pause_challenge(&mut self) -> Result<(), ChallengeError> {
        self.require(ChallengeState::Active, "pause")?;
        if self.paused_at_ms.is_none() {
            self.paused_at_ms = Some(self.clock.now_ms());
            self.timer.pause();
        }
        Ok(())
    }

    pub fn resume_challenge(&mut self) -> Result<(), ChallengeError> {
        self.require(ChallengeState::Active, "resume")?;
        if let Some(paused_at) = self.paused_at_ms.take() {
            self.paused_total_ms += self.clock.now_ms().saturating_sub(paused_at);
            self.timer.start();
        }
        Ok(())
    }

    pub fn add_time(&mut self, seconds: u32) -> Result<TimerEvent, ChallengeError> {
        self.require(ChallengeState::Active, "add time")?;
        let event = self.timer.add_time(seconds);
        if let Some(change) = self
            .indicator
            .update(self.timer.time_left(), self.config.time_limit)
        {
            self.host.on_urgency_change(&change);
        }
        Ok(event)
    }

    /// Return to `Ready`, dropping the action log and result.
    pub fn reset_challenge(&mut self) -> ChallengeEvent {
        self.timer.reset();
        self.indicator.reset(self.config.time_limit);
        self.reveal = None;
        self.state = ChallengeState::Ready;
        self.attempt_id = Uuid::new_v4();
        self.started_at_ms = None;
        self.paused_at_ms = None;
        self.paused_total_ms = 0;
        self.actions.clear();
        self.result = None;
        self.backlog.clear();
        info!(title = %self.config.title, "challenge reset");
        ChallengeEvent::Reset
    }

    /// Forward the "continue" acknowledgment to the result reveal.
    pub fn acknowledge_result(&mut self) -> Option<ChallengeEvent> {
        let event = self.reveal.as_mut()?.acknowledge()?;
        Some(ChallengeEvent::Reveal { event })
    }

    /// Drive the timer, indicator and reveal from the clock.
    pub fn pump(&mut self) -> Vec<ChallengeEvent> {
        let mut events = std::mem::take(&mut self.backlog);

        if self.state == ChallengeState::Active {
            for timer_event in self.timer.pump() {
                events.push(ChallengeEvent::Timer { event: timer_event });
                match timer_event {
                    TimerEvent::Tick { time_left, .. } => {
                        if let Some(change) =
                            self.indicator.update(time_left, self.config.time_limit)
                        {
                            self.host.on_urgency_change(&change);
                            events.push(ChallengeEvent::Urgency { change });
                        }
                        let ctx = self.context();
                        self.body.on_tick(&ctx);
                    }
                    TimerEvent::Completed => {
                        if let Some(result) = self.handle_timeout() {
                            events.push(ChallengeEvent::TimedOut { result });
                        }
                    }
                    _ => {}
                }
            }
        }

        if self.state == ChallengeState::Active {
            if let Some(done) = self.body.take_completion() {
                let result = self.complete(done.accuracy, done.data);
                events.push(ChallengeEvent::Completed { result });
            }
        }

        if self.indicator.poll() {
            events.push(ChallengeEvent::AlertDismissed);
        }

        if let Some(reveal) = self.reveal.as_mut() {
            for event in reveal.poll() {
                if event == RevealEvent::AnimationComplete {
                    self.host.on_animation_complete();
                }
                events.push(ChallengeEvent::Reveal { event });
            }
        }

        events
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn catch_up(&mut self) {
        if self.state == ChallengeState::Active {
            let events = self.pump();
            self.backlog = events;
        }
    }

    fn require(
        &self,
        expected: ChallengeState,
        action: &'static str,
    ) -> Result<(), ChallengeError> {
        if self.state != expected {
            return Err(ChallengeError::InvalidTransition {
                from: self.state,
                action,
            });
        }
        Ok(())
    }

    fn score_input(&self, time_used: f64, accuracy: f64, completed: bool) -> ScoreInput {
        ScoreInput::new(self.config.time_limit, time_used, accuracy, completed)
            .with_weights(self.config.scoring_weights.unwrap_or_default())
    }

    fn finish(&mut self, terminal: ChallengeState) {
        self.timer.pause();
        if let Some(paused_at) = self.paused_at_ms.take() {
            self.paused_total_ms += self.clock.now_ms().saturating_sub(paused_at);
        }
        self.state = terminal;
        let ctx = self.context();
        self.body.on_finish(&ctx);
    }

    fn handle_timeout(&mut self) -> Option<FinalScore> {
        if self.state != ChallengeState::Active {
            return None;
        }
        // A late pump can observe more elapsed time than the countdown held.
        let time_used = self.config.time_limit as f64;
        self.finish(ChallengeState::Timeout);

        let score = calculate_timer_score(self.score_input(time_used, 0.0, false));
        let result = FinalScore {
            attempt_id: self.attempt_id,
            title: self.config.title.clone(),
            score,
            bonus: None,
            final_score: score.total_score,
            actions_count: self.actions.len(),
            timed_out: true,
            additional_data: serde_json::Value::Null,
        };
        info!(total = score.total_score, time_used, "challenge timed out");

        self.reveal = Some(TimerResultAnimation::new(
            Some(&result.score),
            None,
            self.config.reveal,
            self.clock.clone(),
        ));
        self.result = Some(result.clone());
        self.host.on_time_up(&result);
        Some(result)
    }
}
