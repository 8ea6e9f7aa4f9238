//! Module dependency graph.
//!
//! An edge `module -> prerequisite` means the prerequisite must be completed
//! first. The service owns every registered module; the management layer and
//! the prerequisite checker read them through [`ModuleCatalog`].

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::model::{Module, ModuleCatalog, ValidationReport};

/// Answer to "may this learner enter the module".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCheck {
    pub can_start: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_prerequisites: Option<Vec<String>>,
}

impl StartCheck {
    fn denied(reason: String) -> Self {
        Self {
            can_start: false,
            reason,
            missing_prerequisites: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDependencies<'a> {
    /// Registered modules this one requires. Dangling ids are left out.
    pub prerequisites: Vec<&'a Module>,
    /// Registered modules that list this one as a prerequisite.
    pub dependents: Vec<&'a Module>,
}

impl ModuleDependencies<'_> {
    pub fn dependent_ids(&self) -> Vec<String> {
        self.dependents.iter().map(|m| m.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleSequencingService {
    modules: BTreeMap<String, Module>,
}

impl ModuleCatalog for ModuleSequencingService {
    fn module(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    fn modules(&self) -> Box<dyn Iterator<Item = &Module> + '_> {
        Box::new(self.modules.values())
    }
}

impl ModuleSequencingService {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Upsert by id; returns the module it replaced.
    pub fn register_module(&mut self, module: Module) -> Option<Module> {
        info!(module = %module.id, prerequisites = ?module.prerequisites, "module registered");
        self.modules.insert(module.id.clone(), module)
    }

    pub fn unregister_module(&mut self, module_id: &str) -> Option<Module> {
        self.modules.remove(module_id)
    }

    pub fn clear(&mut self) {
        self.modules.clear();
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Published modules whose prerequisites are all completed, by `order`.
    pub fn get_available_modules(&self, completed: &HashSet<String>) -> Vec<&Module> {
        let mut available: Vec<&Module> = self
            .modules
            .values()
            .filter(|m| m.is_published && m.are_prerequisites_met(completed))
            .collect();
        sort_by_order(&mut available);
        available
    }

    /// First available module that is neither completed nor in progress.
    pub fn get_next_recommended_module(
        &self,
        completed: &HashSet<String>,
        in_progress: &HashSet<String>,
    ) -> Option<&Module> {
        self.get_available_modules(completed)
            .into_iter()
            .find(|m| !completed.contains(&m.id) && !in_progress.contains(&m.id))
    }

    pub fn can_start_module(&self, module_id: &str, completed: &HashSet<String>) -> StartCheck {
        let Some(module) = self.modules.get(module_id) else {
            return StartCheck::denied(format!("Module '{module_id}' not found"));
        };
        if !module.is_published {
            return StartCheck::denied(format!("Module '{module_id}' is not published"));
        }
        let missing = module.missing_prerequisites(completed);
        if missing.is_empty() {
            return StartCheck {
                can_start: true,
                reason: "All prerequisites completed".to_string(),
                missing_prerequisites: None,
            };
        }
        StartCheck {
            can_start: false,
            reason: format!("Missing prerequisites: {}", missing.join(", ")),
            missing_prerequisites: Some(missing),
        }
    }

    pub fn get_module_dependencies(&self, module_id: &str) -> ModuleDependencies<'_> {
        let prerequisites = self
            .modules
            .get(module_id)
            .map(|m| {
                m.prerequisites
                    .iter()
                    .filter_map(|id| self.modules.get(id))
                    .collect()
            })
            .unwrap_or_default();
        let dependents = self
            .modules
            .values()
            .filter(|m| m.id != module_id && m.prerequisites.iter().any(|p| p == module_id))
            .collect();
        ModuleDependencies {
            prerequisites,
            dependents,
        }
    }

    /// Reports every dangling prerequisite and every cycle. Never stops early.
    pub fn validate_sequence(&self) -> ValidationReport {
        let mut errors = Vec::new();

        for module in self.modules.values() {
            for prerequisite in &module.prerequisites {
                if !self.modules.contains_key(prerequisite) {
                    errors.push(format!(
                        "Module '{}' has non-existent prerequisite '{}'",
                        module.id, prerequisite
                    ));
                }
            }
        }

        let mut visited = HashSet::new();
        let mut stack = Vec::new();
        for id in self.modules.keys() {
            if !visited.contains(id.as_str()) {
                self.detect_cycles(id, &mut visited, &mut stack, &mut errors);
            }
        }

        debug!(modules = self.modules.len(), errors = errors.len(), "sequence validated");
        ValidationReport::from_errors(errors)
    }

    /// With a target: the prerequisite closure in dependency order, skipping
    /// completed modules. Without: repeatedly take the next recommended module.
    pub fn get_learning_path(
        &self,
        completed: &HashSet<String>,
        target: Option<&str>,
    ) -> Vec<&Module> {
        if let Some(target) = target {
            return self.get_required_modules_for(target, completed);
        }

        let mut done = completed.clone();
        let mut path = Vec::new();
        let in_progress = HashSet::new();
        while let Some(next) = self.get_next_recommended_module(&done, &in_progress) {
            done.insert(next.id.clone());
            path.push(next);
        }
        path
    }

    /// Depth-first: prerequisites before the module itself.
    pub fn get_required_modules_for(
        &self,
        module_id: &str,
        completed: &HashSet<String>,
    ) -> Vec<&Module> {
        let mut seen = HashSet::new();
        let mut path = Vec::new();
        self.collect_required(module_id, completed, &mut seen, &mut path);
        path
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn detect_cycles<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        errors: &mut Vec<String>,
    ) {
        visited.insert(id);
        stack.push(id);

        if let Some(module) = self.modules.get(id) {
            for prerequisite in &module.prerequisites {
                let prerequisite = prerequisite.as_str();
                if let Some(start) = stack.iter().position(|s| *s == prerequisite) {
                    let mut cycle: Vec<&str> = stack[start..].to_vec();
                    cycle.push(prerequisite);
                    errors.push(format!("Circular dependency detected: {}", cycle.join(" -> ")));
                } else if !visited.contains(prerequisite)
                    && self.modules.contains_key(prerequisite)
                {
                    self.detect_cycles(prerequisite, visited, stack, errors);
                }
            }
        }

        stack.pop();
    }

    fn collect_required<'a>(
        &'a self,
        id: &str,
        completed: &HashSet<String>,
        seen: &mut HashSet<String>,
        path: &mut Vec<&'a Module>,
    ) {
        if completed.contains(id) || !seen.insert(id.to_string()) {
            return;
        }
        let Some(module) = self.modules.get(id) else {
            return;
        };
        for prerequisite in &module.prerequisites {
            self.collect_required(prerequisite, completed, seen, path);
        }
        path.push(module);
    }
}

fn sort_by_order(modules: &mut [&Module]) {
    modules.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}
