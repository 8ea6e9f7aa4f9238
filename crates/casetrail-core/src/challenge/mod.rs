//! Timed challenges: countdown, urgency, scoring and result reveal.

pub mod container;
pub mod countdown;
pub mod pressure;
pub mod reveal;
pub mod scoring;

pub use container::{
    BodyCompletion, ChallengeBody, ChallengeConfig, ChallengeContext, ChallengeEvent,
    ChallengeHost, ChallengeState, FinalScore, NoopBody, NoopHost, TimedChallengeContainer,
    UserAction,
};
pub use countdown::{
    format_clock, CountdownTimer, TimerConfig, TimerEvent, TimerListener, TimerSnapshot,
};
pub use pressure::{IndicatorView, TimePressureIndicator, UrgencyChange, ALERT_DISMISS_MS};
pub use reveal::{
    PerformanceTier, ResultSummary, RevealConfig, RevealEvent, RevealStage, TimerResultAnimation,
};
pub use scoring::{
    calculate_time_bonus, calculate_timer_score, calculate_urgency_level, remaining_percentage,
    urgency_level_with, BonusResult, ScoreInput, ScoreResult, ScoringWeights, UrgencyLevel,
};
