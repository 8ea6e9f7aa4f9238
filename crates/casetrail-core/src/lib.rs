//! # Casetrail Core Library
//!
//! Core logic for the Casetrail cybercrime-investigation training platform.
//! Everything is available through the standalone `casetrail-cli` binary;
//! any UI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Challenges**: a caller-driven countdown state machine. The owner pumps
//!   it against a [`clock::TickSource`] and receives events; nothing spawns
//!   threads or sleeps.
//! - **Scoring**: pure functions blending completion, speed and accuracy, plus
//!   a time bonus and urgency classification.
//! - **Catalog**: modules, activities and badges with validation, a
//!   prerequisite graph, rule-based gating and JSON snapshots.
//! - **Config**: TOML defaults for thresholds, weights and reveal pacing.
//!
//! ## Key Components
//!
//! - [`TimedChallengeContainer`]: one timed attempt from start to reveal
//! - [`CountdownTimer`]: tick-driven countdown with threshold events
//! - [`ModuleManagementService`]: catalog CRUD and progression queries
//! - [`TrainingConfig`]: application configuration management

pub mod catalog;
pub mod challenge;
pub mod clock;
pub mod config;
pub mod error;

pub use catalog::{
    Activity, ActivityContent, ActivityType, Badge, CatalogSnapshot, Module,
    ModuleManagementService, ModuleSequencingService, PrerequisiteChecker, ProgressStore,
    UserProgress,
};
pub use challenge::{
    calculate_time_bonus, calculate_timer_score, calculate_urgency_level, ChallengeConfig,
    ChallengeState, CountdownTimer, FinalScore, ScoreInput, ScoreResult, TimedChallengeContainer,
    TimerConfig, UrgencyLevel,
};
pub use clock::{SharedClock, SystemClock, TickSource, VirtualClock};
pub use config::TrainingConfig;
pub use error::{CatalogError, ChallengeError, ConfigError, CoreError, ValidationError};
