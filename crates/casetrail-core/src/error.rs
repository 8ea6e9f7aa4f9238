//! Core error types for casetrail-core.
//!
//! This module defines the error hierarchy using thiserror. Diagnostic
//! operations (validation, prerequisite checks) never return these; they
//! report structured results instead. Mutating operations fail fast.

use std::path::PathBuf;
use thiserror::Error;

use crate::challenge::ChallengeState;

/// Core error type for casetrail-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Catalog mutation errors
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Challenge lifecycle errors
    #[error("Challenge error: {0}")]
    Challenge(#[from] ChallengeError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by mutating catalog operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Module '{0}' not found")]
    ModuleNotFound(String),

    #[error("Activity '{0}' not found")]
    ActivityNotFound(String),

    #[error("Module '{0}' already exists")]
    DuplicateModule(String),

    #[error("Activity '{0}' already exists")]
    DuplicateActivity(String),

    #[error("Badge '{0}' already exists")]
    DuplicateBadge(String),

    #[error("Content schema '{0}' is already registered")]
    DuplicateSchema(String),

    #[error("Content schema '{0}' not found")]
    SchemaNotFound(String),

    /// Validation failed for an entity being written to the catalog.
    #[error("Invalid {entity} '{id}': {}", errors.join("; "))]
    Invalid {
        entity: &'static str,
        id: String,
        errors: Vec<String>,
    },

    /// Removing the module would leave dangling prerequisite edges.
    #[error("Cannot remove module '{id}': required by {}", dependents.join(", "))]
    HasDependents { id: String, dependents: Vec<String> },

    #[error("Incompatible snapshot version {found} (supported: {supported})")]
    IncompatibleVersion { found: String, supported: String },
}

/// Errors raised by the timed challenge state machine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChallengeError {
    #[error("Cannot {action} while challenge is {from:?}")]
    InvalidTransition {
        from: ChallengeState,
        action: &'static str,
    },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Validation errors for construction parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_dependents_lists_every_dependent() {
        let err = CatalogError::HasDependents {
            id: "evidence-101".into(),
            dependents: vec!["tracing-201".into(), "legal-301".into()],
        };
        assert_eq!(
            err.to_string(),
            "Cannot remove module 'evidence-101': required by tracing-201, legal-301"
        );
    }

    #[test]
    fn catalog_error_folds_into_core_error() {
        let core: CoreError = CatalogError::ModuleNotFound("x".into()).into();
        assert!(matches!(core, CoreError::Catalog(CatalogError::ModuleNotFound(_))));
    }

    #[test]
    fn invalid_entity_joins_errors() {
        let err = CatalogError::Invalid {
            entity: "module",
            id: "m1".into(),
            errors: vec!["Title is required".into(), "At least one activity is required".into()],
        };
        assert!(err.to_string().contains("Title is required; At least one activity"));
    }
}
