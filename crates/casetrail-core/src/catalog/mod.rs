//! Training catalog: modules, activities, badges and the rules that gate
//! progression between them.

pub mod content;
pub mod events;
pub mod management;
pub mod model;
pub mod prerequisites;
pub mod progress;
pub mod schema;
pub mod sequencing;
pub mod snapshot;

pub use content::{ActivityContent, ActivityType};
pub use events::{CatalogEvent, CatalogListener, EventEmitter, ListenerId, ALL_EVENTS};
pub use management::{
    CatalogStatistics, ImportSummary, ModuleFilter, ModuleManagementService, UserStartCheck,
};
pub use model::{
    Activity, Aggregation, Badge, BadgeRarity, Difficulty, Module, ModuleCatalog, ModuleSequence,
    ScoreRequirement, ScoreScope, ValidationReport, DEFAULT_MIN_PASSING_SCORE,
};
pub use prerequisites::{
    CustomRule, DetailKind, ExternalValidator, NextStep, NextStepAction, PrerequisiteCheck,
    PrerequisiteChecker, PrerequisiteDetail, RuleKind,
};
pub use progress::{
    InMemoryProgressStore, ProgressAck, ProgressRecord, ProgressStatus, ProgressStore,
    ProgressUpdate, UserProgress,
};
pub use schema::{ContentSchema, ContentSchemaValidator, SchemaRule};
pub use sequencing::{ModuleDependencies, ModuleSequencingService, StartCheck};
pub use snapshot::{CatalogSnapshot, SNAPSHOT_VERSION};
