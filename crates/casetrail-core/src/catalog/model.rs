//! Catalog entities: badges, activities, modules and learning sequences.
//!
//! Validation never fails fast here; every entity reports all of its
//! problems through a [`ValidationReport`]. Serialization is camelCase JSON
//! and is the canonical persisted form.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::content::{ActivityContent, ActivityType};

/// Outcome of a non-throwing validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    pub fn valid() -> Self {
        Self::from_errors(Vec::new())
    }

    /// Append another report's errors, each prefixed with `prefix: `.
    pub fn merge_prefixed(&mut self, prefix: &str, other: ValidationReport) {
        self.errors
            .extend(other.errors.into_iter().map(|e| format!("{prefix}: {e}")));
        self.is_valid = self.errors.is_empty();
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.is_valid = self.errors.is_empty();
    }
}

fn in_unit_range(value: f64) -> bool {
    (0.0..=1.0).contains(&value)
}

// ── Badge ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeRarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Default for BadgeRarity {
    fn default() -> Self {
        BadgeRarity::Common
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub points: u32,
    #[serde(default)]
    pub rarity: BadgeRarity,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Badge {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            image_url: String::new(),
            category: category.into(),
            points: 0,
            rarity: BadgeRarity::Common,
            requirements: Vec::new(),
            is_active: true,
        }
    }

    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("Badge id is required".to_string());
        }
        if self.name.trim().is_empty() {
            errors.push("Badge name is required".to_string());
        }
        ValidationReport::from_errors(errors)
    }
}

// ── Activity ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreScope {
    Module,
    Activity,
    Category,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Average,
    Min,
    Max,
    Sum,
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation::Average
    }
}

/// Minimum score on a module, an activity, or a whole category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRequirement {
    pub scope: ScoreScope,
    pub target: String,
    pub min_score: f64,
    #[serde(default)]
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub content: ActivityContent,
    #[serde(default)]
    pub points: u32,
    /// Seconds.
    #[serde(default)]
    pub time_limit: Option<u32>,
    #[serde(default = "default_activity_passing")]
    pub passing_score: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_true")]
    pub is_required: bool,
    #[serde(default)]
    pub order: i32,
    /// Activity ids within the same module.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub score_prerequisites: Vec<ScoreRequirement>,
    /// Custom rule ids.
    #[serde(default)]
    pub custom_prerequisites: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_activity_passing() -> f64 {
    0.7
}
fn default_max_attempts() -> u32 {
    3
}

impl Activity {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: ActivityContent) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            activity_type: content.activity_type(),
            content,
            points: 0,
            time_limit: None,
            passing_score: default_activity_passing(),
            max_attempts: default_max_attempts(),
            is_required: true,
            order: 0,
            prerequisites: Vec::new(),
            score_prerequisites: Vec::new(),
            custom_prerequisites: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_points(mut self, points: u32) -> Self {
        self.points = points;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_time_limit(mut self, seconds: u32) -> Self {
        self.time_limit = Some(seconds);
        self
    }

    pub fn with_passing_score(mut self, passing_score: f64) -> Self {
        self.passing_score = passing_score;
        self
    }

    pub fn with_prerequisites<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn validate(&self) -> ValidationReport {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("Activity id is required".to_string());
        }
        if self.title.trim().is_empty() {
            errors.push("Activity title is required".to_string());
        }
        if !in_unit_range(self.passing_score) {
            errors.push(format!(
                "Passing score must be between 0 and 1, got {}",
                self.passing_score
            ));
        }
        if self.max_attempts == 0 {
            errors.push("Max attempts must be at least 1".to_string());
        }
        if self.time_limit == Some(0) {
            errors.push("Time limit must be greater than zero".to_string());
        }
        if self.prerequisites.iter().any(|p| p == &self.id) {
            errors.push("Activity cannot be its own prerequisite".to_string());
        }
        if self.content.activity_type() != self.activity_type {
            errors.push(format!(
                "Content of type '{}' does not match activity type '{}'",
                self.content.activity_type(),
                self.activity_type
            ));
        }
        for requirement in &self.score_prerequisites {
            if !in_unit_range(requirement.min_score)
                && requirement.aggregation != Aggregation::Sum
            {
                errors.push(format!(
                    "Score requirement on '{}' must be between 0 and 1",
                    requirement.target
                ));
            }
        }
        ValidationReport::from_errors(errors)
    }
}

// ── Module ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Default for Difficulty {
    fn default() -> Self {
        Difficulty::Beginner
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        })
    }
}

pub const DEFAULT_MIN_PASSING_SCORE: f64 = 0.8;

fn default_min_passing() -> f64 {
    DEFAULT_MIN_PASSING_SCORE
}
fn default_category() -> String {
    "general".to_string()
}

/// A training module. Owns its activities; the badge reward is a reference by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub objectives: Vec<String>,
    /// Module ids that must be completed first.
    #[serde(default)]
    pub prerequisites: Vec<String>,
    /// Custom rule ids evaluated by the prerequisite checker.
    #[serde(default)]
    pub custom_prerequisites: Vec<String>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub badge_reward: Option<String>,
    #[serde(default = "default_min_passing")]
    pub min_passing_score: f64,
    /// Minutes.
    #[serde(default)]
    pub estimated_duration: u32,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub order: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Module {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            objectives: Vec::new(),
            prerequisites: Vec::new(),
            custom_prerequisites: Vec::new(),
            activities: Vec::new(),
            badge_reward: None,
            min_passing_score: DEFAULT_MIN_PASSING_SCORE,
            estimated_duration: 0,
            is_published: false,
            category: default_category(),
            difficulty: Difficulty::Beginner,
            order: 0,
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_prerequisites<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_activity(mut self, activity: Activity) -> Self {
        self.add_activity(activity);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.estimated_duration = minutes;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn published(mut self) -> Self {
        self.is_published = true;
        self
    }

    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::valid();
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("Module id is required".to_string());
        }
        if self.title.trim().is_empty() {
            errors.push("Title is required".to_string());
        }
        if self.description.trim().is_empty() {
            errors.push("Description is required".to_string());
        }
        if self.activities.is_empty() {
            errors.push("At least one activity is required".to_string());
        }
        if !in_unit_range(self.min_passing_score) {
            errors.push(format!(
                "Minimum passing score must be between 0 and 1, got {}",
                self.min_passing_score
            ));
        }
        if self.prerequisites.iter().any(|p| p == &self.id) {
            errors.push("Module cannot be its own prerequisite".to_string());
        }

        let mut seen = HashSet::new();
        for activity in &self.activities {
            if !seen.insert(activity.id.as_str()) {
                errors.push(format!("Duplicate activity id '{}'", activity.id));
            }
        }
        for activity in &self.activities {
            for prerequisite in &activity.prerequisites {
                if prerequisite != &activity.id && !seen.contains(prerequisite.as_str()) {
                    errors.push(format!(
                        "Activity '{}' references unknown activity '{}'",
                        activity.id, prerequisite
                    ));
                }
            }
        }
        report.merge(ValidationReport::from_errors(errors));

        for activity in &self.activities {
            report.merge_prefixed(&format!("Activity '{}'", activity.id), activity.validate());
        }
        report
    }

    pub fn total_points(&self) -> u32 {
        self.activities.iter().map(|a| a.points).sum()
    }

    pub fn required_activities(&self) -> impl Iterator<Item = &Activity> {
        self.activities.iter().filter(|a| a.is_required)
    }

    pub fn activity(&self, activity_id: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.id == activity_id)
    }

    /// Insert keeping activities ordered by `order`; ties keep insertion order.
    pub fn add_activity(&mut self, activity: Activity) {
        let index = self
            .activities
            .iter()
            .position(|a| a.order > activity.order)
            .unwrap_or(self.activities.len());
        self.activities.insert(index, activity);
        self.touch();
    }

    pub fn remove_activity(&mut self, activity_id: &str) -> Option<Activity> {
        let index = self.activities.iter().position(|a| a.id == activity_id)?;
        self.touch();
        Some(self.activities.remove(index))
    }

    pub fn are_prerequisites_met(&self, completed: &HashSet<String>) -> bool {
        self.prerequisites.iter().all(|p| completed.contains(p))
    }

    pub fn missing_prerequisites(&self, completed: &HashSet<String>) -> Vec<String> {
        self.prerequisites
            .iter()
            .filter(|p| !completed.contains(*p))
            .cloned()
            .collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Read access to a set of modules keyed by id.
pub trait ModuleCatalog {
    fn module(&self, id: &str) -> Option<&Module>;

    fn modules(&self) -> Box<dyn Iterator<Item = &Module> + '_>;

    fn find_activity(&self, activity_id: &str) -> Option<(&Module, &Activity)> {
        self.modules()
            .find_map(|m| m.activity(activity_id).map(|a| (m, a)))
    }
}

impl ModuleCatalog for BTreeMap<String, Module> {
    fn module(&self, id: &str) -> Option<&Module> {
        self.get(id)
    }

    fn modules(&self) -> Box<dyn Iterator<Item = &Module> + '_> {
        Box::new(self.values())
    }
}

// ── ModuleSequence ───────────────────────────────────────────────────

/// A named learning path that owns its modules in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleSequence {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub modules: Vec<Module>,
    /// Minutes; sum of member modules.
    #[serde(default)]
    pub estimated_duration: u32,
}

impl ModuleSequence {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            modules: Vec::new(),
            estimated_duration: 0,
        }
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.push(module);
        self.recompute_duration();
    }

    pub fn remove_module(&mut self, module_id: &str) -> Option<Module> {
        let index = self.modules.iter().position(|m| m.id == module_id)?;
        let removed = self.modules.remove(index);
        self.recompute_duration();
        Some(removed)
    }

    pub fn total_points(&self) -> u32 {
        self.modules.iter().map(Module::total_points).sum()
    }

    fn recompute_duration(&mut self) {
        self.estimated_duration = self.modules.iter().map(|m| m.estimated_duration).sum();
    }
}
