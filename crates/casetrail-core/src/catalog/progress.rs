//! Learner progress snapshots and the persistence boundary.
//!
//! The catalog only ever reads a [`UserProgress`]; writing it back is the
//! job of a [`ProgressStore`] supplied by the host.

use std::collections::{HashMap, HashSet};
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::model::Badge;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub status: ProgressStatus,
    /// Best score so far, 0.0..=1.0.
    #[serde(default)]
    pub score: f64,
    /// Seconds.
    #[serde(default)]
    pub time_spent: u64,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempts: u32,
}

impl ProgressRecord {
    pub fn completed(score: f64) -> Self {
        Self {
            status: ProgressStatus::Completed,
            score,
            time_spent: 0,
            completed_at: Some(Utc::now()),
            attempts: 1,
        }
    }

    pub fn in_progress() -> Self {
        Self {
            status: ProgressStatus::InProgress,
            ..Self::default()
        }
    }

    pub fn with_time_spent(mut self, seconds: u64) -> Self {
        self.time_spent = seconds;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProgressStatus::Completed
    }
}

/// One learner's recorded progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    #[serde(default)]
    pub modules: HashMap<String, ProgressRecord>,
    #[serde(default)]
    pub activities: HashMap<String, ProgressRecord>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub streaks: HashMap<String, u32>,
}

impl UserProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module_id: impl Into<String>, record: ProgressRecord) -> Self {
        self.modules.insert(module_id.into(), record);
        self
    }

    pub fn with_activity(mut self, activity_id: impl Into<String>, record: ProgressRecord) -> Self {
        self.activities.insert(activity_id.into(), record);
        self
    }

    pub fn with_badge(mut self, badge: Badge) -> Self {
        self.badges.push(badge);
        self
    }

    pub fn with_streak(mut self, name: impl Into<String>, days: u32) -> Self {
        self.streaks.insert(name.into(), days);
        self
    }

    pub fn module(&self, module_id: &str) -> Option<&ProgressRecord> {
        self.modules.get(module_id)
    }

    pub fn activity(&self, activity_id: &str) -> Option<&ProgressRecord> {
        self.activities.get(activity_id)
    }

    /// Module record first, then activity record.
    pub fn record(&self, id: &str) -> Option<&ProgressRecord> {
        self.module(id).or_else(|| self.activity(id))
    }

    pub fn completed_module_ids(&self) -> HashSet<String> {
        self.module_ids_with(ProgressStatus::Completed)
    }

    pub fn in_progress_module_ids(&self) -> HashSet<String> {
        self.module_ids_with(ProgressStatus::InProgress)
    }

    pub fn completed_activity_ids(&self) -> HashSet<String> {
        self.activities
            .iter()
            .filter(|(_, r)| r.is_completed())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Seconds spent on `target`, or on everything when `target` is empty or `*`.
    pub fn time_spent_on(&self, target: &str) -> u64 {
        if target.is_empty() || target == "*" {
            return self.modules.values().map(|r| r.time_spent).sum();
        }
        self.record(target).map(|r| r.time_spent).unwrap_or(0)
    }

    pub fn streak(&self, name: &str) -> u32 {
        self.streaks.get(name).copied().unwrap_or(0)
    }

    fn module_ids_with(&self, status: ProgressStatus) -> HashSet<String> {
        self.modules
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Fold an update in. Scores keep the best attempt and time accumulates.
    pub fn apply(&mut self, update: &ProgressUpdate, now: DateTime<Utc>) -> ProgressStatus {
        let record = match &update.activity_id {
            Some(activity_id) => self.activities.entry(activity_id.clone()).or_default(),
            None => self.modules.entry(update.module_id.clone()).or_default(),
        };
        record.attempts += 1;
        record.time_spent += update.time_spent;
        record.score = record.score.max(update.score);
        if update.completed {
            if !record.is_completed() {
                record.completed_at = Some(now);
            }
            record.status = ProgressStatus::Completed;
        } else if record.status == ProgressStatus::NotStarted {
            record.status = ProgressStatus::InProgress;
        }
        let status = record.status;

        if update.activity_id.is_some() {
            let module = self.modules.entry(update.module_id.clone()).or_default();
            module.time_spent += update.time_spent;
            if module.status == ProgressStatus::NotStarted {
                module.status = ProgressStatus::InProgress;
            }
        }
        status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub module_id: String,
    #[serde(default)]
    pub activity_id: Option<String>,
    pub completed: bool,
    pub score: f64,
    #[serde(default)]
    pub time_spent: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressAck {
    pub user_id: String,
    pub module_id: String,
    pub activity_id: Option<String>,
    pub status: ProgressStatus,
    pub updated_at: DateTime<Utc>,
}

/// Where learner progress lives. Implementations decide durability.
pub trait ProgressStore: Send + Sync {
    fn get_user_progress(&self, user_id: &str) -> impl Future<Output = Result<UserProgress>> + Send;

    fn update_progress(
        &self,
        user_id: &str,
        update: ProgressUpdate,
    ) -> impl Future<Output = Result<ProgressAck>> + Send;
}

/// Process-local store. Unknown users read as empty progress.
#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    users: RwLock<HashMap<String, UserProgress>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, user_id: impl Into<String>, progress: UserProgress) {
        self.users.write().await.insert(user_id.into(), progress);
    }
}

impl ProgressStore for InMemoryProgressStore {
    async fn get_user_progress(&self, user_id: &str) -> Result<UserProgress> {
        Ok(self.users.read().await.get(user_id).cloned().unwrap_or_default())
    }

    async fn update_progress(&self, user_id: &str, update: ProgressUpdate) -> Result<ProgressAck> {
        let now = Utc::now();
        let mut users = self.users.write().await;
        let status = users.entry(user_id.to_string()).or_default().apply(&update, now);
        debug!(user = user_id, module = %update.module_id, ?status, "progress updated");
        Ok(ProgressAck {
            user_id: user_id.to_string(),
            module_id: update.module_id,
            activity_id: update.activity_id,
            status,
            updated_at: now,
        })
    }
}
