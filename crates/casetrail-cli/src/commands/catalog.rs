use std::path::PathBuf;

use casetrail_core::catalog::{
    CatalogSnapshot, ContentSchemaValidator, Module, ModuleFilter, ModuleManagementService,
    PrerequisiteChecker, ProgressRecord, UserProgress,
};
use casetrail_core::TrainingConfig;
use clap::{Args, Subcommand};
use serde_json::json;
use tracing::debug;

#[derive(Args)]
pub struct Source {
    /// Catalog snapshot JSON; defaults to `catalog.catalog_file` from config
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args)]
pub struct Learner {
    /// Completed modules, as `id` or `id=score`
    #[arg(long, value_delimiter = ',')]
    completed: Vec<String>,
}

#[derive(Subcommand)]
pub enum CatalogAction {
    /// Validate the whole catalog
    Validate {
        #[command(flatten)]
        source: Source,
    },
    /// Catalog statistics
    Stats {
        #[command(flatten)]
        source: Source,
    },
    /// List modules, optionally filtered
    List {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        category: Option<String>,
        /// Only published modules
        #[arg(long)]
        published: bool,
    },
    /// Modules the learner can start now
    Available {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        learner: Learner,
    },
    /// Ordered modules still to take
    Path {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        learner: Learner,
        /// Stop at this module
        #[arg(long)]
        target: Option<String>,
    },
    /// Explain whether the learner may start a module
    CanStart {
        module_id: String,
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        learner: Learner,
    },
}

fn load_service(source: &Source) -> Result<ModuleManagementService, Box<dyn std::error::Error>> {
    let config = TrainingConfig::load_or_default();
    let path = source
        .file
        .clone()
        .or_else(|| config.catalog_file())
        .ok_or("no catalog file: pass --file or set catalog.catalog_file")?;
    debug!(path = %path.display(), strict = config.catalog.strict_schemas, "loading catalog");
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let snapshot = CatalogSnapshot::from_json(&content)?;

    let schemas = if config.catalog.strict_schemas {
        ContentSchemaValidator::with_defaults()
    } else {
        ContentSchemaValidator::new()
    };
    let mut service = ModuleManagementService::with_components(PrerequisiteChecker::new(), schemas);
    service.initialize(snapshot)?;
    Ok(service)
}

fn learner_progress(learner: &Learner) -> Result<UserProgress, Box<dyn std::error::Error>> {
    let mut progress = UserProgress::new();
    for entry in learner.completed.iter().filter(|e| !e.trim().is_empty()) {
        let (id, score) = match entry.split_once('=') {
            Some((id, score)) => (id.trim(), score.trim().parse::<f64>()?),
            None => (entry.trim(), 1.0),
        };
        progress = progress.with_module(id, ProgressRecord::completed(score));
    }
    Ok(progress)
}

fn summaries(modules: &[&Module]) -> serde_json::Value {
    modules
        .iter()
        .map(|m| {
            json!({
                "id": m.id,
                "title": m.title,
                "category": m.category,
                "difficulty": m.difficulty,
                "order": m.order,
                "prerequisites": m.prerequisites,
                "isPublished": m.is_published,
            })
        })
        .collect()
}

pub fn run(action: CatalogAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        CatalogAction::Validate { source } => {
            let service = load_service(&source)?;
            let report = service.validate_system();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_valid {
                return Err(format!("catalog has {} error(s)", report.errors.len()).into());
            }
        }
        CatalogAction::Stats { source } => {
            let service = load_service(&source)?;
            println!("{}", serde_json::to_string_pretty(&service.get_statistics())?);
        }
        CatalogAction::List {
            source,
            category,
            published,
        } => {
            let service = load_service(&source)?;
            let filter = ModuleFilter {
                category,
                is_published: published.then_some(true),
                ..ModuleFilter::default()
            };
            let modules = service.get_modules(&filter);
            println!("{}", serde_json::to_string_pretty(&summaries(&modules))?);
        }
        CatalogAction::Available { source, learner } => {
            let service = load_service(&source)?;
            let progress = learner_progress(&learner)?;
            let available = service.get_available_modules(&progress);
            let next = service.get_next_recommended_module(&progress).map(|m| m.id.clone());
            let out = json!({
                "available": summaries(&available),
                "nextRecommended": next,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        CatalogAction::Path {
            source,
            learner,
            target,
        } => {
            let service = load_service(&source)?;
            let progress = learner_progress(&learner)?;
            if let Some(target) = &target {
                if service.get_module(target).is_none() {
                    return Err(format!("module '{target}' not found").into());
                }
            }
            let path = service.get_learning_path(&progress, target.as_deref());
            let ids: Vec<&str> = path.iter().map(|m| m.id.as_str()).collect();
            println!("{}", serde_json::to_string_pretty(&ids)?);
        }
        CatalogAction::CanStart {
            module_id,
            source,
            learner,
        } => {
            let service = load_service(&source)?;
            let progress = learner_progress(&learner)?;
            let check = service.can_user_start_module(&module_id, &progress);
            println!("{}", serde_json::to_string_pretty(&check)?);
        }
    }
    Ok(())
}
