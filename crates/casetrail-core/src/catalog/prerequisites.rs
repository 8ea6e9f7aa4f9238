//! Prerequisite rule evaluation against a learner's progress.
//!
//! Topology (which module points at which) lives in `sequencing`; this module
//! answers whether the recorded progress actually satisfies each rule. Every
//! check is evaluated and reported, nothing short-circuits, so a UI can list
//! exactly what is outstanding.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::model::{
    Aggregation, ModuleCatalog, ScoreRequirement, ScoreScope, DEFAULT_MIN_PASSING_SCORE,
};
use super::progress::UserProgress;

/// A plugin predicate for rule types the checker does not know natively.
pub type ExternalValidator = Box<dyn Fn(&UserProgress) -> Result<bool, String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleKind {
    /// Seconds spent on `target` (module or activity id, `*` for everything).
    TimeSpent { target: String, threshold: u64 },
    /// Earned active badges, optionally limited to one category.
    BadgeEarned {
        #[serde(default)]
        category: Option<String>,
        threshold: usize,
    },
    Streak { name: String, threshold: u32 },
    /// Evaluated by a validator registered under the rule id.
    External,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    pub rule: RuleKind,
}

impl CustomRule {
    pub fn new(id: impl Into<String>, description: impl Into<String>, rule: RuleKind) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            rule,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailKind {
    ModuleCompletion,
    ActivityCompletion,
    Score,
    Custom,
}

/// One individual prerequisite check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteDetail {
    pub kind: DetailKind,
    pub target: String,
    pub is_met: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<f64>,
}

impl PrerequisiteDetail {
    fn new(kind: DetailKind, target: &str, is_met: bool, message: String) -> Self {
        Self {
            kind,
            target: target.to_string(),
            is_met,
            message,
            current: None,
            required: None,
        }
    }

    fn with_values(mut self, current: f64, required: f64) -> Self {
        self.current = Some(current);
        self.required = Some(required);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteCheck {
    pub is_met: bool,
    pub reason: String,
    pub details: Vec<PrerequisiteDetail>,
}

impl PrerequisiteCheck {
    fn not_found(what: &str, id: &str) -> Self {
        Self {
            is_met: false,
            reason: format!("{what} '{id}' not found"),
            details: Vec::new(),
        }
    }

    fn from_details(details: Vec<PrerequisiteDetail>) -> Self {
        let unmet: Vec<&str> = details
            .iter()
            .filter(|d| !d.is_met)
            .map(|d| d.message.as_str())
            .collect();
        let reason = if unmet.is_empty() {
            "All prerequisites met".to_string()
        } else {
            format!("Missing prerequisites: {}", unmet.join("; "))
        };
        Self {
            is_met: unmet.is_empty(),
            reason,
            details,
        }
    }

    pub fn unmet(&self) -> impl Iterator<Item = &PrerequisiteDetail> {
        self.details.iter().filter(|d| !d.is_met)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStepAction {
    CompleteModule,
    CompleteActivity,
    ImproveScore,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    pub action: NextStepAction,
    pub target: String,
    pub description: String,
}

/// Evaluates prerequisite rules. Holds custom rules and external validators;
/// modules are read from whichever catalog is passed in.
#[derive(Default)]
pub struct PrerequisiteChecker {
    rules: BTreeMap<String, CustomRule>,
    validators: HashMap<String, ExternalValidator>,
}

impl fmt::Debug for PrerequisiteChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrerequisiteChecker")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .field("validators", &self.validators.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PrerequisiteChecker {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Upsert a custom rule by id.
    pub fn register_rule(&mut self, rule: CustomRule) {
        self.rules.insert(rule.id.clone(), rule);
    }

    pub fn rule(&self, rule_id: &str) -> Option<&CustomRule> {
        self.rules.get(rule_id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &CustomRule> {
        self.rules.values()
    }

    pub fn register_validator<F>(&mut self, rule_id: impl Into<String>, validator: F)
    where
        F: Fn(&UserProgress) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.validators.insert(rule_id.into(), Box::new(validator));
    }

    pub fn remove_validator(&mut self, rule_id: &str) -> bool {
        self.validators.remove(rule_id).is_some()
    }

    // ── Checks ───────────────────────────────────────────────────────

    pub fn check_module_prerequisites<C: ModuleCatalog + ?Sized>(
        &self,
        catalog: &C,
        module_id: &str,
        progress: &UserProgress,
    ) -> PrerequisiteCheck {
        let Some(module) = catalog.module(module_id) else {
            return PrerequisiteCheck::not_found("Module", module_id);
        };
        let mut details: Vec<PrerequisiteDetail> = module
            .prerequisites
            .iter()
            .map(|id| self.check_module_completion(catalog, id, progress))
            .collect();
        details.extend(
            module
                .custom_prerequisites
                .iter()
                .map(|rule_id| self.check_custom_rule(rule_id, progress)),
        );
        let check = PrerequisiteCheck::from_details(details);
        debug!(module = module_id, is_met = check.is_met, "module prerequisites checked");
        check
    }

    pub fn check_activity_prerequisites<C: ModuleCatalog + ?Sized>(
        &self,
        catalog: &C,
        activity_id: &str,
        progress: &UserProgress,
    ) -> PrerequisiteCheck {
        let Some((module, activity)) = catalog.find_activity(activity_id) else {
            return PrerequisiteCheck::not_found("Activity", activity_id);
        };
        let mut details = Vec::new();
        for prerequisite in &activity.prerequisites {
            let passing = module
                .activity(prerequisite)
                .map(|a| a.passing_score)
                .unwrap_or(0.0);
            details.push(completion_detail(
                DetailKind::ActivityCompletion,
                "activity",
                prerequisite,
                progress.activity(prerequisite).map(|r| (r.is_completed(), r.score)),
                passing,
            ));
        }
        details.extend(
            activity
                .score_prerequisites
                .iter()
                .map(|req| self.check_score_requirement(catalog, req, progress)),
        );
        details.extend(
            activity
                .custom_prerequisites
                .iter()
                .map(|rule_id| self.check_custom_rule(rule_id, progress)),
        );
        PrerequisiteCheck::from_details(details)
    }

    /// Completed with a score at or above the module's passing score.
    pub fn check_module_completion<C: ModuleCatalog + ?Sized>(
        &self,
        catalog: &C,
        module_id: &str,
        progress: &UserProgress,
    ) -> PrerequisiteDetail {
        let required = catalog
            .module(module_id)
            .map(|m| m.min_passing_score)
            .unwrap_or(DEFAULT_MIN_PASSING_SCORE);
        completion_detail(
            DetailKind::ModuleCompletion,
            "module",
            module_id,
            progress.module(module_id).map(|r| (r.is_completed(), r.score)),
            required,
        )
    }

    pub fn check_score_requirement<C: ModuleCatalog + ?Sized>(
        &self,
        catalog: &C,
        requirement: &ScoreRequirement,
        progress: &UserProgress,
    ) -> PrerequisiteDetail {
        let (label, current) = match requirement.scope {
            ScoreScope::Module => ("Module", progress.module(&requirement.target).map(|r| r.score)),
            ScoreScope::Activity => (
                "Activity",
                progress.activity(&requirement.target).map(|r| r.score),
            ),
            ScoreScope::Category => (
                "Category",
                Some(self.calculate_category_score(
                    catalog,
                    &requirement.target,
                    progress,
                    requirement.aggregation,
                )),
            ),
        };
        let current = current.unwrap_or(0.0);
        let is_met = current >= requirement.min_score;
        let message = if is_met {
            format!("{label} '{}' score requirement met", requirement.target)
        } else {
            format!(
                "{label} '{}' score {current:.2} is below required {:.2}",
                requirement.target, requirement.min_score
            )
        };
        PrerequisiteDetail::new(DetailKind::Score, &requirement.target, is_met, message)
            .with_values(current, requirement.min_score)
    }

    /// Evaluate a rule by id. Validator errors and panics count as unmet.
    pub fn check_custom_rule(&self, rule_id: &str, progress: &UserProgress) -> PrerequisiteDetail {
        let rule = self.rules.get(rule_id);
        let label = rule
            .map(|r| r.description.as_str())
            .filter(|d| !d.is_empty())
            .unwrap_or(rule_id);

        let outcome = match rule.map(|r| &r.rule) {
            Some(RuleKind::TimeSpent { target, threshold }) => {
                let spent = progress.time_spent_on(target);
                Ok((spent >= *threshold, Some((spent as f64, *threshold as f64))))
            }
            Some(RuleKind::BadgeEarned { category, threshold }) => {
                let earned = progress
                    .badges
                    .iter()
                    .filter(|b| b.is_active)
                    .filter(|b| category.as_ref().map_or(true, |c| &b.category == c))
                    .count();
                Ok((earned >= *threshold, Some((earned as f64, *threshold as f64))))
            }
            Some(RuleKind::Streak { name, threshold }) => {
                let days = progress.streak(name);
                Ok((days >= *threshold, Some((f64::from(days), f64::from(*threshold)))))
            }
            Some(RuleKind::External) | None => {
                self.run_validator(rule_id, progress).map(|met| (met, None))
            }
        };

        match outcome {
            Ok((is_met, values)) => {
                let message = if is_met {
                    format!("Rule '{label}' satisfied")
                } else {
                    format!("Rule '{label}' not satisfied")
                };
                let detail = PrerequisiteDetail::new(DetailKind::Custom, rule_id, is_met, message);
                match values {
                    Some((current, required)) => detail.with_values(current, required),
                    None => detail,
                }
            }
            Err(message) => PrerequisiteDetail::new(
                DetailKind::Custom,
                rule_id,
                false,
                format!("Rule '{label}' could not be evaluated: {message}"),
            ),
        }
    }

    fn run_validator(&self, rule_id: &str, progress: &UserProgress) -> Result<bool, String> {
        let Some(validator) = self.validators.get(rule_id) else {
            return Err("unknown rule".to_string());
        };
        match panic::catch_unwind(AssertUnwindSafe(|| validator(progress))) {
            Ok(Ok(met)) => Ok(met),
            Ok(Err(message)) => {
                warn!(rule = rule_id, error = %message, "prerequisite validator failed");
                Err(message)
            }
            Err(_) => {
                warn!(rule = rule_id, "prerequisite validator panicked");
                Err("validator panicked".to_string())
            }
        }
    }

    /// Aggregate score of completed modules in `category`; 0 when there are none.
    pub fn calculate_category_score<C: ModuleCatalog + ?Sized>(
        &self,
        catalog: &C,
        category: &str,
        progress: &UserProgress,
        aggregation: Aggregation,
    ) -> f64 {
        let scores: Vec<f64> = catalog
            .modules()
            .filter(|m| m.category == category)
            .filter_map(|m| progress.module(&m.id))
            .filter(|r| r.is_completed())
            .map(|r| r.score)
            .collect();
        if scores.is_empty() {
            return 0.0;
        }
        match aggregation {
            Aggregation::Average => scores.iter().sum::<f64>() / scores.len() as f64,
            Aggregation::Min => scores.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregation::Max => scores.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregation::Sum => scores.iter().sum(),
        }
    }

    /// One remediation step per unmet detail, in order.
    pub fn get_next_steps(&self, details: &[PrerequisiteDetail]) -> Vec<NextStep> {
        details
            .iter()
            .filter(|d| !d.is_met)
            .map(|d| {
                let (action, description) = match d.kind {
                    DetailKind::ModuleCompletion => (
                        NextStepAction::CompleteModule,
                        format!("Complete the module '{}'", d.target),
                    ),
                    DetailKind::ActivityCompletion => (
                        NextStepAction::CompleteActivity,
                        format!("Complete the activity '{}'", d.target),
                    ),
                    DetailKind::Score => (
                        NextStepAction::ImproveScore,
                        match d.required {
                            Some(required) => format!(
                                "Raise your score on '{}' to at least {:.0}%",
                                d.target,
                                required * 100.0
                            ),
                            None => format!("Raise your score on '{}'", d.target),
                        },
                    ),
                    DetailKind::Custom => (NextStepAction::Custom, d.message.clone()),
                };
                NextStep {
                    action,
                    target: d.target.clone(),
                    description,
                }
            })
            .collect()
    }
}

/// A completion check; a completed record under the passing score is a score problem.
fn completion_detail(
    kind: DetailKind,
    what: &str,
    id: &str,
    record: Option<(bool, f64)>,
    required: f64,
) -> PrerequisiteDetail {
    match record {
        Some((true, score)) if score >= required => {
            PrerequisiteDetail::new(kind, id, true, format!("Completed {what} '{id}'"))
                .with_values(score, required)
        }
        Some((true, score)) => PrerequisiteDetail::new(
            DetailKind::Score,
            id,
            false,
            format!("Score {score:.2} on {what} '{id}' is below required {required:.2}"),
        )
        .with_values(score, required),
        _ => PrerequisiteDetail::new(kind, id, false, format!("Complete {what} '{id}'")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::catalog::content::{ActivityContent, ReadingContent};
    use crate::catalog::model::{Activity, Badge, Module};
    use crate::catalog::progress::ProgressRecord;

    fn reading(id: &str) -> Activity {
        Activity::new(
            id,
            id,
            ActivityContent::Reading(ReadingContent {
                body: "text".into(),
                sections: Vec::new(),
            }),
        )
    }

    fn catalog() -> BTreeMap<String, Module> {
        let basics = Module::new("basics", "Basics", "Intro")
            .with_category("forensics")
            .with_activity(reading("a1"));
        let mut tracing = Module::new("tracing", "Tracing", "Follow the money")
            .with_category("finance")
            .with_prerequisites(["basics"])
            .with_activity(reading("b1"))
            .with_activity(reading("b2").with_prerequisites(["b1"]).with_order(1));
        tracing.custom_prerequisites = vec!["study-time".into()];
        let advanced = Module::new("advanced", "Advanced", "Deep dive")
            .with_category("forensics")
            .with_activity(reading("c1"));
        [basics, tracing, advanced]
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect()
    }

    fn checker() -> PrerequisiteChecker {
        let mut checker = PrerequisiteChecker::new();
        checker.register_rule(CustomRule::new(
            "study-time",
            "Ten minutes of study",
            RuleKind::TimeSpent {
                target: "*".into(),
                threshold: 600,
            },
        ));
        checker
    }

    #[test]
    fn reports_every_detail_without_short_circuit() {
        let check =
            checker().check_module_prerequisites(&catalog(), "tracing", &UserProgress::new());
        assert!(!check.is_met);
        assert_eq!(check.details.len(), 2);
        assert!(check.reason.contains("Complete module 'basics'"));
        assert!(check.reason.contains("Ten minutes of study"));
    }

    #[test]
    fn low_score_is_reported_as_score_problem() {
        let progress = UserProgress::new()
            .with_module("basics", ProgressRecord::completed(0.6).with_time_spent(900));
        let check = checker().check_module_prerequisites(&catalog(), "tracing", &progress);
        assert!(!check.is_met);
        let detail = &check.details[0];
        assert_eq!(detail.kind, DetailKind::Score);
        assert_eq!(detail.required, Some(0.8));
        assert!(check.details[1].is_met);

        let steps = checker().get_next_steps(&check.details);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].action, NextStepAction::ImproveScore);
        assert_eq!(steps[0].description, "Raise your score on 'basics' to at least 80%");
    }

    #[test]
    fn passes_once_completed_with_enough_time() {
        let progress = UserProgress::new()
            .with_module("basics", ProgressRecord::completed(0.8).with_time_spent(600));
        let check = checker().check_module_prerequisites(&catalog(), "tracing", &progress);
        assert!(check.is_met, "{}", check.reason);
        assert_eq!(check.reason, "All prerequisites met");
    }

    #[test]
    fn unknown_module_is_not_met() {
        let check = checker().check_module_prerequisites(&catalog(), "ghost", &UserProgress::new());
        assert!(!check.is_met);
        assert_eq!(check.reason, "Module 'ghost' not found");
    }

    #[test]
    fn activity_prerequisites_use_passing_score() {
        let catalog = catalog();
        let checker = checker();
        let failing = UserProgress::new().with_activity("b1", ProgressRecord::completed(0.5));
        let check = checker.check_activity_prerequisites(&catalog, "b2", &failing);
        assert!(!check.is_met);

        let passing = UserProgress::new().with_activity("b1", ProgressRecord::completed(0.7));
        assert!(checker.check_activity_prerequisites(&catalog, "b2", &passing).is_met);
        assert!(checker.check_activity_prerequisites(&catalog, "b1", &failing).is_met);
    }

    #[test]
    fn category_score_aggregations() {
        let catalog = catalog();
        let checker = checker();
        let progress = UserProgress::new()
            .with_module("basics", ProgressRecord::completed(0.9))
            .with_module("advanced", ProgressRecord::completed(0.7))
            .with_module("tracing", ProgressRecord::completed(0.1));
        let score = |agg| checker.calculate_category_score(&catalog, "forensics", &progress, agg);
        assert!((score(Aggregation::Average) - 0.8).abs() < 1e-9);
        assert_eq!(score(Aggregation::Min), 0.7);
        assert_eq!(score(Aggregation::Max), 0.9);
        assert!((score(Aggregation::Sum) - 1.6).abs() < 1e-9);
        assert_eq!(
            checker.calculate_category_score(&catalog, "legal", &progress, Aggregation::Average),
            0.0
        );
    }

    #[test]
    fn badge_and_streak_rules() {
        let mut checker = checker();
        checker.register_rule(CustomRule::new(
            "two-forensics-badges",
            "",
            RuleKind::BadgeEarned {
                category: Some("forensics".into()),
                threshold: 2,
            },
        ));
        checker.register_rule(CustomRule::new(
            "weekly",
            "",
            RuleKind::Streak {
                name: "daily".into(),
                threshold: 7,
            },
        ));
        let progress = UserProgress::new()
            .with_badge(Badge::new("b1", "Imager", "forensics"))
            .with_badge(Badge::new("b2", "Tracer", "finance"))
            .with_streak("daily", 7);
        assert!(!checker.check_custom_rule("two-forensics-badges", &progress).is_met);
        assert!(checker.check_custom_rule("weekly", &progress).is_met);
    }

    #[test]
    fn external_validators_are_isolated() {
        let mut checker = checker();
        checker.register_validator("always", |_| Ok(true));
        checker.register_validator("broken", |_| Err("backend offline".to_string()));
        checker.register_validator("panics", |_| panic!("validator bug"));
        let progress = UserProgress::new();

        assert!(checker.check_custom_rule("always", &progress).is_met);
        let broken = checker.check_custom_rule("broken", &progress);
        assert!(!broken.is_met);
        assert!(broken.message.contains("backend offline"));
        assert!(!checker.check_custom_rule("panics", &progress).is_met);
        assert!(!checker.check_custom_rule("unregistered", &progress).is_met);
    }

    #[test]
    fn score_requirement_on_category() {
        let catalog = catalog();
        let requirement = ScoreRequirement {
            scope: ScoreScope::Category,
            target: "forensics".into(),
            min_score: 0.75,
            aggregation: Aggregation::Average,
        };
        let progress = UserProgress::new().with_module("basics", ProgressRecord::completed(0.8));
        assert!(checker().check_score_requirement(&catalog, &requirement, &progress).is_met);
    }
}
