//! Versioned content schemas bound to activity types.
//!
//! A schema is a list of field rules applied to the JSON form of an
//! activity's content. Every type ships with a default schema; authors can
//! register more and toggle them on or off, but never edit a registered one.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::content::{ActivityContent, ActivityType};
use super::model::{Activity, ValidationReport};
use crate::error::CatalogError;

/// A single rule over a dot-separated content field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SchemaRule {
    /// Field must be present and not null.
    Required { field: String },
    /// String must have non-whitespace text, array must have an element.
    NonEmpty { field: String },
    MinItems { field: String, min: usize },
    MaxItems { field: String, max: usize },
    MaxLength { field: String, max: usize },
}

impl SchemaRule {
    pub fn field(&self) -> &str {
        match self {
            SchemaRule::Required { field }
            | SchemaRule::NonEmpty { field }
            | SchemaRule::MinItems { field, .. }
            | SchemaRule::MaxItems { field, .. }
            | SchemaRule::MaxLength { field, .. } => field,
        }
    }

    fn check(&self, root: &Value) -> Option<String> {
        let field = self.field();
        let value = lookup(root, field).filter(|v| !v.is_null());
        match (self, value) {
            (_, None) => Some(format!("Field '{field}' is required")),
            (SchemaRule::Required { .. }, Some(_)) => None,
            (SchemaRule::NonEmpty { .. }, Some(v)) => {
                let empty = match v {
                    Value::String(s) => s.trim().is_empty(),
                    Value::Array(items) => items.is_empty(),
                    Value::Object(map) => map.is_empty(),
                    _ => false,
                };
                empty.then(|| format!("Field '{field}' must not be empty"))
            }
            (SchemaRule::MinItems { min, .. }, Some(v)) => match v.as_array() {
                Some(items) if items.len() >= *min => None,
                Some(items) => Some(format!(
                    "Field '{field}' needs at least {min} items, found {}",
                    items.len()
                )),
                None => Some(format!("Field '{field}' must be a list")),
            },
            (SchemaRule::MaxItems { max, .. }, Some(v)) => match v.as_array() {
                Some(items) if items.len() <= *max => None,
                Some(items) => Some(format!(
                    "Field '{field}' allows at most {max} items, found {}",
                    items.len()
                )),
                None => Some(format!("Field '{field}' must be a list")),
            },
            (SchemaRule::MaxLength { max, .. }, Some(v)) => match v.as_str() {
                Some(s) if s.chars().count() <= *max => None,
                Some(_) => Some(format!("Field '{field}' is longer than {max} characters")),
                None => Some(format!("Field '{field}' must be text")),
            },
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = root;
    for part in path.split('.') {
        current = match current {
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            other => other.get(part)?,
        };
    }
    Some(current)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSchema {
    pub id: String,
    pub name: String,
    pub version: String,
    pub activity_type: ActivityType,
    pub rules: Vec<SchemaRule>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ContentSchema {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        activity_type: ActivityType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: "1.0.0".to_string(),
            activity_type,
            rules: Vec::new(),
            is_active: true,
        }
    }

    pub fn with_rule(mut self, rule: SchemaRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    fn check(&self, content: &Value) -> Vec<String> {
        self.rules.iter().filter_map(|rule| rule.check(content)).collect()
    }

    /// The schema every activity type carries out of the box.
    pub fn default_for(activity_type: ActivityType) -> Self {
        let field = |name: &str| name.to_string();
        let schema = ContentSchema::new(
            format!("{activity_type}-default"),
            format!("Default {activity_type} schema"),
            activity_type,
        );
        match activity_type {
            ActivityType::Quiz => schema.with_rule(SchemaRule::MinItems {
                field: field("questions"),
                min: 1,
            }),
            ActivityType::Simulation => schema
                .with_rule(SchemaRule::NonEmpty { field: field("scenario") })
                .with_rule(SchemaRule::MinItems { field: field("steps"), min: 1 }),
            ActivityType::Roleplay => schema
                .with_rule(SchemaRule::NonEmpty { field: field("scenario") })
                .with_rule(SchemaRule::NonEmpty { field: field("character") })
                .with_rule(SchemaRule::MinItems { field: field("prompts"), min: 1 }),
            ActivityType::Dragdrop => schema.with_rule(SchemaRule::MinItems {
                field: field("items"),
                min: 2,
            }),
            ActivityType::Interactive => schema.with_rule(SchemaRule::MinItems {
                field: field("blanks"),
                min: 1,
            }),
            ActivityType::Reading => {
                schema.with_rule(SchemaRule::NonEmpty { field: field("body") })
            }
        }
    }
}

/// Registry of content schemas, validating payloads against every active
/// schema for their type.
#[derive(Debug, Clone, Default)]
pub struct ContentSchemaValidator {
    schemas: BTreeMap<String, ContentSchema>,
}

impl ContentSchemaValidator {
    /// An empty registry; only variant-intrinsic checks apply.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut validator = Self::new();
        for activity_type in ActivityType::ALL {
            let schema = ContentSchema::default_for(activity_type);
            validator.schemas.insert(schema.id.clone(), schema);
        }
        validator
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn schema(&self, id: &str) -> Option<&ContentSchema> {
        self.schemas.get(id)
    }

    pub fn schemas(&self) -> impl Iterator<Item = &ContentSchema> {
        self.schemas.values()
    }

    pub fn active_schemas_for(
        &self,
        activity_type: ActivityType,
    ) -> impl Iterator<Item = &ContentSchema> {
        self.schemas
            .values()
            .filter(move |s| s.is_active && s.activity_type == activity_type)
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn register(&mut self, schema: ContentSchema) -> Result<(), CatalogError> {
        if self.schemas.contains_key(&schema.id) {
            return Err(CatalogError::DuplicateSchema(schema.id));
        }
        debug!(
            schema = %schema.id,
            activity_type = %schema.activity_type,
            "registered content schema"
        );
        self.schemas.insert(schema.id.clone(), schema);
        Ok(())
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> Result<(), CatalogError> {
        let schema = self
            .schemas
            .get_mut(id)
            .ok_or_else(|| CatalogError::SchemaNotFound(id.to_string()))?;
        schema.is_active = active;
        Ok(())
    }

    // ── Validation ───────────────────────────────────────────────────

    pub fn validate_content(&self, content: &ActivityContent) -> ValidationReport {
        let mut errors = content.structural_errors();
        match serde_json::to_value(content) {
            Ok(json) => {
                for schema in self.active_schemas_for(content.activity_type()) {
                    errors.extend(
                        schema
                            .check(&json)
                            .into_iter()
                            .map(|e| format!("{} ({}): {e}", schema.name, schema.version)),
                    );
                }
            }
            Err(e) => errors.push(format!("Content could not be serialized: {e}")),
        }
        ValidationReport::from_errors(errors)
    }

    /// Entity checks plus content checks, in one report.
    pub fn validate_activity(&self, activity: &Activity) -> ValidationReport {
        let mut report = activity.validate();
        report.merge_prefixed("Content", self.validate_content(&activity.content));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::content::{QuizContent, ReadingContent};

    fn empty_quiz() -> ActivityContent {
        ActivityContent::Quiz(QuizContent { questions: Vec::new() })
    }

    #[test]
    fn defaults_cover_every_type() {
        let validator = ContentSchemaValidator::with_defaults();
        for activity_type in ActivityType::ALL {
            assert_eq!(validator.active_schemas_for(activity_type).count(), 1);
        }
    }

    #[test]
    fn default_quiz_schema_requires_a_question() {
        let validator = ContentSchemaValidator::with_defaults();
        let report = validator.validate_content(&empty_quiz());
        assert!(!report.is_valid);
        assert!(report.errors[0].contains("at least 1 items"));
        assert!(ContentSchemaValidator::new().validate_content(&empty_quiz()).is_valid);
    }

    #[test]
    fn inactive_schemas_are_skipped() {
        let mut validator = ContentSchemaValidator::with_defaults();
        validator.set_active("quiz-default", false).unwrap();
        assert!(validator.validate_content(&empty_quiz()).is_valid);
        assert!(matches!(
            validator.set_active("missing", true),
            Err(CatalogError::SchemaNotFound(_))
        ));
    }

    #[test]
    fn registered_schemas_stack_and_reject_duplicates() {
        let mut validator = ContentSchemaValidator::with_defaults();
        let strict = ContentSchema::new("reading-short", "Short reading", ActivityType::Reading)
            .with_version("2.0.0")
            .with_rule(SchemaRule::MaxLength { field: "body".into(), max: 10 });
        validator.register(strict.clone()).unwrap();
        assert_eq!(
            validator.register(strict),
            Err(CatalogError::DuplicateSchema("reading-short".into()))
        );

        let content = ActivityContent::Reading(ReadingContent {
            body: "Preserve volatile memory before shutdown.".into(),
            sections: Vec::new(),
        });
        let report = validator.validate_content(&content);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Short reading (2.0.0)"));
    }

    #[test]
    fn lookup_walks_arrays_by_index() {
        let json = serde_json::json!({"steps": [{"id": "s1"}]});
        assert_eq!(lookup(&json, "steps.0.id"), Some(&Value::String("s1".into())));
        assert_eq!(lookup(&json, "steps.1.id"), None);
        assert_eq!(lookup(&json, ""), None);
    }
}
