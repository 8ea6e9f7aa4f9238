//! Catalog composition root.
//!
//! Wires the sequencing graph, the prerequisite checker and the content
//! schema validator over one in-memory store. Mutations validate first and
//! fail fast; queries never fail and return structured answers. The service
//! is single-writer: hosts serialize calls.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::content::ActivityType;
use super::events::{CatalogEvent, EventEmitter, ListenerId};
use super::model::{Activity, Badge, Difficulty, Module, ModuleCatalog, ValidationReport};
use super::prerequisites::{NextStep, PrerequisiteCheck, PrerequisiteChecker};
use super::progress::UserProgress;
use super::schema::ContentSchemaValidator;
use super::sequencing::ModuleSequencingService;
use super::snapshot::{check_compatibility, CatalogSnapshot, Compatibility, SNAPSHOT_VERSION};
use crate::error::CatalogError;

/// Query filter for [`ModuleManagementService::get_modules`]. Empty matches all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub is_published: Option<bool>,
    /// Module must carry every listed tag.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ModuleFilter {
    pub fn matches(&self, module: &Module) -> bool {
        self.category.as_ref().map_or(true, |c| &module.category == c)
            && self.difficulty.map_or(true, |d| module.difficulty == d)
            && self.is_published.map_or(true, |p| module.is_published == p)
            && self.tags.iter().all(|t| module.tags.contains(t))
    }
}

/// Topology and rule checks merged into one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStartCheck {
    pub can_start: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_prerequisites: Option<Vec<String>>,
    pub prerequisites: PrerequisiteCheck,
    pub next_steps: Vec<NextStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStatistics {
    pub total_modules: usize,
    pub published_modules: usize,
    pub draft_modules: usize,
    pub total_activities: usize,
    pub total_badges: usize,
    pub active_badges: usize,
    pub total_points: u32,
    /// Minutes.
    pub total_estimated_duration: u32,
    pub modules_by_category: BTreeMap<String, usize>,
    pub modules_by_difficulty: BTreeMap<String, usize>,
    pub activities_by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub modules: usize,
    pub badges: usize,
}

/// Everything a mutation may touch. Cloned to stage imports atomically.
#[derive(Debug, Clone, Default)]
struct CatalogState {
    sequencing: ModuleSequencingService,
    badges: BTreeMap<String, Badge>,
    /// Activity id to owning module id.
    activity_index: HashMap<String, String>,
}

impl CatalogState {
    fn check_module(
        &self,
        module: &Module,
        schemas: &ContentSchemaValidator,
    ) -> Result<(), CatalogError> {
        for activity in &module.activities {
            if let Some(owner) = self.activity_index.get(&activity.id) {
                if owner != &module.id {
                    return Err(CatalogError::DuplicateActivity(activity.id.clone()));
                }
            }
        }

        let mut report = module.validate();
        for activity in &module.activities {
            report.merge_prefixed(
                &format!("Activity '{}' content", activity.id),
                schemas.validate_content(&activity.content),
            );
        }
        if let Some(badge_id) = &module.badge_reward {
            if !self.badges.contains_key(badge_id) {
                report.merge(ValidationReport::from_errors(vec![format!(
                    "Badge reward '{badge_id}' does not exist"
                )]));
            }
        }
        if report.is_valid {
            Ok(())
        } else {
            Err(CatalogError::Invalid {
                entity: "module",
                id: module.id.clone(),
                errors: report.errors,
            })
        }
    }

    fn insert_badge(&mut self, badge: Badge) -> Result<(), CatalogError> {
        if self.badges.contains_key(&badge.id) {
            return Err(CatalogError::DuplicateBadge(badge.id));
        }
        let report = badge.validate();
        if !report.is_valid {
            return Err(CatalogError::Invalid {
                entity: "badge",
                id: badge.id,
                errors: report.errors,
            });
        }
        self.badges.insert(badge.id.clone(), badge);
        Ok(())
    }

    fn insert_module(
        &mut self,
        module: Module,
        schemas: &ContentSchemaValidator,
    ) -> Result<(), CatalogError> {
        if self.sequencing.module(&module.id).is_some() {
            return Err(CatalogError::DuplicateModule(module.id));
        }
        self.check_module(&module, schemas)?;
        self.index(&module);
        self.sequencing.register_module(module);
        Ok(())
    }

    /// Validate `updated` against the store and swap it in for `module_id`.
    fn replace_module(
        &mut self,
        module_id: &str,
        mut updated: Module,
        schemas: &ContentSchemaValidator,
    ) -> Result<(), CatalogError> {
        if updated.id != module_id {
            return Err(CatalogError::Invalid {
                entity: "module",
                id: module_id.to_string(),
                errors: vec![format!("Module id cannot change to '{}'", updated.id)],
            });
        }
        self.check_module(&updated, schemas)?;
        updated.touch();
        if let Some(previous) = self.sequencing.module(module_id).cloned() {
            self.unindex(&previous);
        }
        self.index(&updated);
        self.sequencing.register_module(updated);
        Ok(())
    }

    fn index(&mut self, module: &Module) {
        for activity in &module.activities {
            self.activity_index.insert(activity.id.clone(), module.id.clone());
        }
    }

    fn unindex(&mut self, module: &Module) {
        for activity in &module.activities {
            self.activity_index.remove(&activity.id);
        }
    }
}

#[derive(Debug)]
pub struct ModuleManagementService {
    state: CatalogState,
    checker: PrerequisiteChecker,
    schemas: ContentSchemaValidator,
    emitter: EventEmitter,
}

impl Default for ModuleManagementService {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleManagementService {
    /// Empty catalog with the default content schemas.
    pub fn new() -> Self {
        Self::with_components(PrerequisiteChecker::new(), ContentSchemaValidator::with_defaults())
    }

    pub fn with_components(checker: PrerequisiteChecker, schemas: ContentSchemaValidator) -> Self {
        Self {
            state: CatalogState::default(),
            checker,
            schemas,
            emitter: EventEmitter::new(),
        }
    }

    /// Replace the whole catalog with a snapshot.
    pub fn initialize(&mut self, snapshot: CatalogSnapshot) -> Result<ImportSummary, CatalogError> {
        let result = self.stage_import(CatalogState::default(), snapshot);
        let summary = self.report_failure("initialize", result)?;
        self.emit(CatalogEvent::Initialized {
            modules: summary.modules,
            badges: summary.badges,
            at: Utc::now(),
        });
        Ok(summary)
    }

    // ── Components ───────────────────────────────────────────────────

    pub fn sequencing(&self) -> &ModuleSequencingService {
        &self.state.sequencing
    }

    pub fn checker(&self) -> &PrerequisiteChecker {
        &self.checker
    }

    /// Register custom rules and validators here.
    pub fn checker_mut(&mut self) -> &mut PrerequisiteChecker {
        &mut self.checker
    }

    pub fn schemas(&self) -> &ContentSchemaValidator {
        &self.schemas
    }

    pub fn schemas_mut(&mut self) -> &mut ContentSchemaValidator {
        &mut self.schemas
    }

    // ── Listeners ────────────────────────────────────────────────────

    pub fn on<F>(&mut self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&CatalogEvent) -> Result<(), String> + Send + Sync + 'static,
    {
        self.emitter.on(event, listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.emitter.off(id)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn add_module(&mut self, module: Module) -> Result<(), CatalogError> {
        let module_id = module.id.clone();
        let result = self.state.insert_module(module, &self.schemas);
        self.report_failure("addModule", result)?;
        info!(module = %module_id, "module added");
        self.emit(CatalogEvent::ModuleAdded {
            module_id,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Apply `edit` to a copy of the module; the copy replaces the original
    /// only if it still validates.
    pub fn update_module<F>(&mut self, module_id: &str, edit: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&mut Module),
    {
        let result = match self.state.sequencing.module(module_id).cloned() {
            Some(mut updated) => {
                edit(&mut updated);
                self.state.replace_module(module_id, updated, &self.schemas)
            }
            None => Err(CatalogError::ModuleNotFound(module_id.to_string())),
        };
        self.report_failure("updateModule", result)?;
        info!(module = module_id, "module updated");
        self.emit(CatalogEvent::ModuleUpdated {
            module_id: module_id.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Fails while another module lists this one as a prerequisite.
    pub fn remove_module(&mut self, module_id: &str) -> Result<Module, CatalogError> {
        let result = self.detach_module(module_id);
        let removed = self.report_failure("removeModule", result)?;
        info!(module = module_id, "module removed");
        self.emit(CatalogEvent::ModuleRemoved {
            module_id: module_id.to_string(),
            at: Utc::now(),
        });
        Ok(removed)
    }

    pub fn add_activity_to_module(
        &mut self,
        module_id: &str,
        activity: Activity,
    ) -> Result<(), CatalogError> {
        let activity_id = activity.id.clone();
        let result = if self.state.activity_index.contains_key(&activity_id) {
            Err(CatalogError::DuplicateActivity(activity_id.clone()))
        } else {
            match self.state.sequencing.module(module_id).cloned() {
                Some(mut updated) => {
                    updated.add_activity(activity);
                    self.state.replace_module(module_id, updated, &self.schemas)
                }
                None => Err(CatalogError::ModuleNotFound(module_id.to_string())),
            }
        };
        self.report_failure("addActivityToModule", result)?;
        self.emit(CatalogEvent::ActivityAdded {
            module_id: module_id.to_string(),
            activity_id,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Fails if the module would be left invalid, e.g. with no activities or
    /// with another activity still depending on the removed one.
    pub fn remove_activity_from_module(
        &mut self,
        module_id: &str,
        activity_id: &str,
    ) -> Result<Activity, CatalogError> {
        let result = match self.state.sequencing.module(module_id).cloned() {
            Some(mut updated) => match updated.remove_activity(activity_id) {
                Some(removed) => self
                    .state
                    .replace_module(module_id, updated, &self.schemas)
                    .map(|()| removed),
                None => Err(CatalogError::ActivityNotFound(activity_id.to_string())),
            },
            None => Err(CatalogError::ModuleNotFound(module_id.to_string())),
        };
        let removed = self.report_failure("removeActivityFromModule", result)?;
        self.emit(CatalogEvent::ActivityRemoved {
            module_id: module_id.to_string(),
            activity_id: activity_id.to_string(),
            at: Utc::now(),
        });
        Ok(removed)
    }

    pub fn add_badge(&mut self, badge: Badge) -> Result<(), CatalogError> {
        let badge_id = badge.id.clone();
        let result = self.state.insert_badge(badge);
        self.report_failure("addBadge", result)?;
        self.emit(CatalogEvent::BadgeAdded {
            badge_id,
            at: Utc::now(),
        });
        Ok(())
    }

    /// Merge a snapshot into the catalog. All or nothing.
    pub fn import_data(
        &mut self,
        snapshot: CatalogSnapshot,
    ) -> Result<ImportSummary, CatalogError> {
        let result = self.stage_import(self.state.clone(), snapshot);
        let summary = self.report_failure("importData", result)?;
        info!(modules = summary.modules, badges = summary.badges, "catalog data imported");
        self.emit(CatalogEvent::DataImported {
            modules: summary.modules,
            badges: summary.badges,
            at: Utc::now(),
        });
        Ok(summary)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn get_module(&self, module_id: &str) -> Option<&Module> {
        self.state.sequencing.module(module_id)
    }

    pub fn get_activity(&self, activity_id: &str) -> Option<&Activity> {
        let module_id = self.state.activity_index.get(activity_id)?;
        self.state.sequencing.module(module_id)?.activity(activity_id)
    }

    pub fn get_badge(&self, badge_id: &str) -> Option<&Badge> {
        self.state.badges.get(badge_id)
    }

    pub fn badges(&self) -> impl Iterator<Item = &Badge> {
        self.state.badges.values()
    }

    /// Matching modules ordered by `order`, then id.
    pub fn get_modules(&self, filter: &ModuleFilter) -> Vec<&Module> {
        let mut modules: Vec<&Module> = self
            .state
            .sequencing
            .modules()
            .filter(|m| filter.matches(m))
            .collect();
        modules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        modules
    }

    pub fn get_available_modules(&self, progress: &UserProgress) -> Vec<&Module> {
        self.state
            .sequencing
            .get_available_modules(&progress.completed_module_ids())
    }

    pub fn get_next_recommended_module(&self, progress: &UserProgress) -> Option<&Module> {
        self.state.sequencing.get_next_recommended_module(
            &progress.completed_module_ids(),
            &progress.in_progress_module_ids(),
        )
    }

    pub fn can_user_start_module(
        &self,
        module_id: &str,
        progress: &UserProgress,
    ) -> UserStartCheck {
        let topology = self
            .state
            .sequencing
            .can_start_module(module_id, &progress.completed_module_ids());
        let rules = self
            .checker
            .check_module_prerequisites(&self.state.sequencing, module_id, progress);
        let next_steps = self.checker.get_next_steps(&rules.details);

        let reason = if !topology.can_start {
            topology.reason
        } else if !rules.is_met {
            rules.reason.clone()
        } else {
            "Ready to start".to_string()
        };
        UserStartCheck {
            can_start: topology.can_start && rules.is_met,
            reason,
            missing_prerequisites: topology.missing_prerequisites,
            prerequisites: rules,
            next_steps,
        }
    }

    pub fn get_learning_path(&self, progress: &UserProgress, target: Option<&str>) -> Vec<&Module> {
        self.state
            .sequencing
            .get_learning_path(&progress.completed_module_ids(), target)
    }

    pub fn get_statistics(&self) -> CatalogStatistics {
        let mut stats = CatalogStatistics {
            total_badges: self.state.badges.len(),
            active_badges: self.state.badges.values().filter(|b| b.is_active).count(),
            ..CatalogStatistics::default()
        };
        for activity_type in ActivityType::ALL {
            stats.activities_by_type.insert(activity_type.to_string(), 0);
        }
        for module in self.state.sequencing.modules() {
            stats.total_modules += 1;
            if module.is_published {
                stats.published_modules += 1;
            } else {
                stats.draft_modules += 1;
            }
            stats.total_activities += module.activities.len();
            stats.total_points += module.total_points();
            stats.total_estimated_duration += module.estimated_duration;
            *stats.modules_by_category.entry(module.category.clone()).or_default() += 1;
            *stats
                .modules_by_difficulty
                .entry(module.difficulty.to_string())
                .or_default() += 1;
            for activity in &module.activities {
                *stats
                    .activities_by_type
                    .entry(activity.activity_type.to_string())
                    .or_default() += 1;
            }
        }
        stats
    }

    /// Graph checks, entity checks and index consistency, all reported.
    pub fn validate_system(&self) -> ValidationReport {
        let mut report = self.state.sequencing.validate_sequence();

        let mut owners: HashMap<&str, &str> = HashMap::new();
        for module in self.state.sequencing.modules() {
            report.merge_prefixed(&format!("Module '{}'", module.id), module.validate());
            for activity in &module.activities {
                report.merge_prefixed(
                    &format!("Module '{}' activity '{}' content", module.id, activity.id),
                    self.schemas.validate_content(&activity.content),
                );
                if let Some(first) = owners.insert(&activity.id, &module.id) {
                    report.merge(ValidationReport::from_errors(vec![format!(
                        "Activity '{}' appears in both '{first}' and '{}'",
                        activity.id, module.id
                    )]));
                }
            }
            if let Some(badge_id) = &module.badge_reward {
                if !self.state.badges.contains_key(badge_id) {
                    report.merge(ValidationReport::from_errors(vec![format!(
                        "Module '{}' rewards unknown badge '{badge_id}'",
                        module.id
                    )]));
                }
            }
        }

        let mut orphans: Vec<String> = self
            .state
            .activity_index
            .iter()
            .filter(|(activity_id, module_id)| {
                owners.get(activity_id.as_str()) != Some(&module_id.as_str())
            })
            .map(|(activity_id, module_id)| {
                format!("Orphaned activity '{activity_id}' (indexed under '{module_id}')")
            })
            .collect();
        orphans.sort();
        report.merge(ValidationReport::from_errors(orphans));

        let indexed: HashSet<&str> = self.state.activity_index.keys().map(String::as_str).collect();
        let mut unindexed: Vec<String> = owners
            .keys()
            .filter(|id| !indexed.contains(*id))
            .map(|id| format!("Activity '{id}' is not indexed"))
            .collect();
        unindexed.sort();
        report.merge(ValidationReport::from_errors(unindexed));

        if !report.is_valid {
            warn!(errors = report.errors.len(), "catalog validation failed");
        }
        report
    }

    pub fn export_data(&self) -> CatalogSnapshot {
        CatalogSnapshot::new(
            self.state.sequencing.modules().cloned().collect(),
            self.state.badges.values().cloned().collect(),
        )
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn detach_module(&mut self, module_id: &str) -> Result<Module, CatalogError> {
        if self.state.sequencing.module(module_id).is_none() {
            return Err(CatalogError::ModuleNotFound(module_id.to_string()));
        }
        let dependents = self
            .state
            .sequencing
            .get_module_dependencies(module_id)
            .dependent_ids();
        if !dependents.is_empty() {
            return Err(CatalogError::HasDependents {
                id: module_id.to_string(),
                dependents,
            });
        }
        let removed = self
            .state
            .sequencing
            .unregister_module(module_id)
            .ok_or_else(|| CatalogError::ModuleNotFound(module_id.to_string()))?;
        self.state.unindex(&removed);
        Ok(removed)
    }

    /// Apply the snapshot on top of `staged`; commit only if everything fits.
    fn stage_import(
        &mut self,
        mut staged: CatalogState,
        snapshot: CatalogSnapshot,
    ) -> Result<ImportSummary, CatalogError> {
        match check_compatibility(SNAPSHOT_VERSION, &snapshot.version) {
            Compatibility::Compatible => {}
            Compatibility::MinorNewer { current, import } => {
                warn!(%current, %import, "importing snapshot from a newer minor version");
            }
            Compatibility::Incompatible { current, import } => {
                return Err(CatalogError::IncompatibleVersion {
                    found: import,
                    supported: current,
                });
            }
        }

        let summary = ImportSummary {
            modules: snapshot.modules.len(),
            badges: snapshot.badges.len(),
        };
        for badge in snapshot.badges {
            staged.insert_badge(badge)?;
        }
        for module in snapshot.modules {
            staged.insert_module(module, &self.schemas)?;
        }
        self.state = staged;
        Ok(summary)
    }

    fn report_failure<T>(
        &self,
        operation: &str,
        result: Result<T, CatalogError>,
    ) -> Result<T, CatalogError> {
        if let Err(err) = &result {
            warn!(operation, error = %err, "catalog mutation rejected");
            self.emit(CatalogEvent::Error {
                operation: operation.to_string(),
                message: err.to_string(),
                at: Utc::now(),
            });
        }
        result
    }

    fn emit(&self, event: CatalogEvent) {
        self.emitter.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::catalog::content::{ActivityContent, QuizContent, QuizQuestion, ReadingContent};
    use crate::catalog::progress::ProgressRecord;

    fn reading(id: &str) -> Activity {
        Activity::new(
            id,
            id,
            ActivityContent::Reading(ReadingContent {
                body: "Document every transfer of the seized device.".into(),
                sections: Vec::new(),
            }),
        )
        .with_points(10)
    }

    fn module(id: &str, prerequisites: &[&str]) -> Module {
        Module::new(id, id, format!("{id} module"))
            .with_prerequisites(prerequisites.iter().copied())
            .with_activity(reading(&format!("{id}-a1")))
            .published()
    }

    fn service() -> ModuleManagementService {
        let mut service = ModuleManagementService::new();
        service.add_module(module("intro", &[])).unwrap();
        service.add_module(module("evidence", &["intro"])).unwrap();
        service
    }

    #[test]
    fn add_module_validates_and_indexes() {
        let service = service();
        assert!(service.get_module("evidence").is_some());
        assert_eq!(service.get_activity("evidence-a1").map(|a| a.id.as_str()), Some("evidence-a1"));

        let mut service = service;
        let err = service.add_module(Module::new("empty", "Empty", "")).unwrap_err();
        match err {
            CatalogError::Invalid { entity, errors, .. } => {
                assert_eq!(entity, "module");
                assert_eq!(errors.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            service.add_module(module("intro", &[])),
            Err(CatalogError::DuplicateModule("intro".into()))
        );
    }

    #[test]
    fn content_schema_is_enforced_on_add() {
        let mut service = ModuleManagementService::new();
        let quiz = Activity::new(
            "q",
            "Quiz",
            ActivityContent::Quiz(QuizContent {
                questions: vec![QuizQuestion {
                    id: "q1".into(),
                    prompt: "Which section governs electronic evidence?".into(),
                    options: vec!["65B".into()],
                    correct_index: 3,
                    explanation: String::new(),
                }],
            }),
        );
        let bad = Module::new("legal", "Legal", "Case building").with_activity(quiz);
        let err = service.add_module(bad).unwrap_err();
        assert!(err.to_string().contains("Activity 'q' content"));
    }

    #[test]
    fn remove_module_guards_dependents() {
        let mut service = service();
        assert_eq!(
            service.remove_module("intro"),
            Err(CatalogError::HasDependents {
                id: "intro".into(),
                dependents: vec!["evidence".into()],
            })
        );
        service.remove_module("evidence").unwrap();
        assert!(service.get_activity("evidence-a1").is_none());
        service.remove_module("intro").unwrap();
        assert_eq!(
            service.remove_module("intro"),
            Err(CatalogError::ModuleNotFound("intro".into()))
        );
    }

    #[test]
    fn update_revalidates_and_keeps_original_on_failure() {
        let mut service = service();
        service
            .update_module("intro", |m| m.title = "Introduction".into())
            .unwrap();
        assert_eq!(service.get_module("intro").unwrap().title, "Introduction");

        let err = service.update_module("intro", |m| m.min_passing_score = 2.0);
        assert!(matches!(err, Err(CatalogError::Invalid { .. })));
        assert_eq!(service.get_module("intro").unwrap().min_passing_score, 0.8);

        assert!(matches!(
            service.update_module("intro", |m| m.id = "renamed".into()),
            Err(CatalogError::Invalid { .. })
        ));
    }

    #[test]
    fn activities_can_be_added_and_removed() {
        let mut service = service();
        service
            .add_activity_to_module("intro", reading("intro-a2").with_prerequisites(["intro-a1"]))
            .unwrap();
        assert_eq!(
            service.add_activity_to_module("evidence", reading("intro-a2")),
            Err(CatalogError::DuplicateActivity("intro-a2".into()))
        );
        assert!(matches!(
            service.remove_activity_from_module("intro", "intro-a1"),
            Err(CatalogError::Invalid { .. })
        ));
        service.remove_activity_from_module("intro", "intro-a2").unwrap();
        assert!(matches!(
            service.remove_activity_from_module("intro", "intro-a1"),
            Err(CatalogError::Invalid { .. })
        ));
        assert_eq!(
            service.remove_activity_from_module("intro", "nope"),
            Err(CatalogError::ActivityNotFound("nope".into()))
        );
    }

    #[test]
    fn badge_rewards_must_exist() {
        let mut service = service();
        let mut rewarded = module("tracing", &["intro"]);
        rewarded.badge_reward = Some("tracer".into());
        assert!(service.add_module(rewarded.clone()).is_err());

        service.add_badge(Badge::new("tracer", "Money Tracer", "finance")).unwrap();
        service.add_module(rewarded).unwrap();
        assert_eq!(service.get_badge("tracer").map(|b| b.name.as_str()), Some("Money Tracer"));
        assert_eq!(
            service.add_badge(Badge::new("tracer", "Again", "finance")),
            Err(CatalogError::DuplicateBadge("tracer".into()))
        );
    }

    #[test]
    fn user_start_check_merges_topology_and_rules() {
        let service = service();
        let fresh = UserProgress::new();
        let check = service.can_user_start_module("evidence", &fresh);
        assert!(!check.can_start);
        assert_eq!(check.missing_prerequisites, Some(vec!["intro".to_string()]));
        assert_eq!(check.next_steps.len(), 1);

        let weak = UserProgress::new().with_module("intro", ProgressRecord::completed(0.5));
        let check = service.can_user_start_module("evidence", &weak);
        assert!(!check.can_start, "completed but below passing score");
        assert!(check.missing_prerequisites.is_none());

        let strong = UserProgress::new().with_module("intro", ProgressRecord::completed(0.9));
        let check = service.can_user_start_module("evidence", &strong);
        assert!(check.can_start);
        assert_eq!(check.reason, "Ready to start");
        assert!(check.next_steps.is_empty());
    }

    #[test]
    fn filters_and_statistics() {
        let mut service = service();
        service
            .add_module(
                module("finance", &[])
                    .with_category("finance")
                    .with_difficulty(Difficulty::Advanced)
                    .with_tags(["upi", "mule"]),
            )
            .unwrap();
        let filter = ModuleFilter {
            tags: vec!["mule".into()],
            ..ModuleFilter::default()
        };
        assert_eq!(service.get_modules(&filter).len(), 1);
        assert_eq!(service.get_modules(&ModuleFilter::default()).len(), 3);

        let stats = service.get_statistics();
        assert_eq!(stats.total_modules, 3);
        assert_eq!(stats.published_modules, 3);
        assert_eq!(stats.total_activities, 3);
        assert_eq!(stats.total_points, 30);
        assert_eq!(stats.modules_by_category.get("finance"), Some(&1));
        assert_eq!(stats.modules_by_difficulty.get("beginner"), Some(&2));
        assert_eq!(stats.activities_by_type.get("reading"), Some(&3));
        assert_eq!(stats.activities_by_type.get("quiz"), Some(&0));
    }

    #[test]
    fn validate_system_reports_dangling_edges() {
        let mut service = service();
        service.add_module(module("orphan", &["missing"])).unwrap();
        let report = service.validate_system();
        assert!(!report.is_valid);
        assert_eq!(
            report.errors,
            vec!["Module 'orphan' has non-existent prerequisite 'missing'".to_string()]
        );
        service.remove_module("orphan").unwrap();
        assert!(service.validate_system().is_valid);
    }

    #[test]
    fn export_import_round_trip() {
        let mut source = service();
        source.add_badge(Badge::new("first", "First steps", "general")).unwrap();
        let snapshot = source.export_data();
        assert_eq!(snapshot.activities.len(), 2);

        let mut target = ModuleManagementService::new();
        let summary = target.import_data(snapshot.clone()).unwrap();
        assert_eq!(summary, ImportSummary { modules: 2, badges: 1 });
        assert_eq!(target.export_data().modules, snapshot.modules);

        assert!(target.import_data(snapshot.clone()).is_err(), "duplicates rejected");
        assert_eq!(target.get_statistics().total_modules, 2, "failed import changes nothing");

        let mut future = snapshot;
        future.version = "2.0.0".into();
        assert!(matches!(
            target.initialize(future),
            Err(CatalogError::IncompatibleVersion { .. })
        ));
    }

    #[test]
    fn events_reach_listeners_and_errors_are_emitted() {
        let mut service = ModuleManagementService::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        service.on("*", move |event| {
            sink.lock().map_err(|e| e.to_string())?.push(event.name());
            Ok(())
        });
        service.on("moduleAdded", |_| panic!("listener bug"));

        service.add_module(module("intro", &[])).unwrap();
        let _ = service.remove_module("ghost");
        assert_eq!(*seen.lock().unwrap(), vec!["moduleAdded", "error"]);
    }
}
