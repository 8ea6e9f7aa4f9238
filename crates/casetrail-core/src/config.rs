//! TOML-based training configuration.
//!
//! Stores the defaults every challenge and catalog command starts from:
//! - Urgency thresholds and alert timing
//! - Score component weights
//! - Result reveal pacing
//! - Catalog location and schema strictness
//!
//! Configuration is stored at `~/.config/casetrail/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::challenge::{
    ChallengeConfig, RevealConfig, ScoringWeights, TimerConfig, ALERT_DISMISS_MS,
};
use crate::challenge::scoring::{CRITICAL_PERCENT, WARNING_PERCENT};
use crate::error::{ConfigError, ValidationError};

/// Returns `~/.config/casetrail[-dev]/` based on CASETRAIL_ENV.
///
/// Set CASETRAIL_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the config directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("CASETRAIL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("casetrail-dev")
    } else {
        base_dir.join("casetrail")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Countdown and urgency settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerSection {
    /// Percent of time left at which the warning fires.
    #[serde(default = "default_warning_percent")]
    pub warning_percent: u32,
    #[serde(default = "default_critical_percent")]
    pub critical_percent: u32,
    #[serde(default = "default_alert_dismiss_ms")]
    pub alert_dismiss_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringSection {
    #[serde(default = "default_completion_weight")]
    pub completion_weight: f64,
    #[serde(default = "default_speed_weight")]
    pub speed_weight: f64,
    #[serde(default = "default_accuracy_weight")]
    pub accuracy_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealSection {
    #[serde(default = "default_reveal_delay_ms")]
    pub reveal_delay_ms: u64,
    #[serde(default = "default_details_delay_ms")]
    pub details_delay_ms: u64,
    #[serde(default = "default_complete_delay_ms")]
    pub complete_delay_ms: u64,
    /// 0 waits for an explicit acknowledgment.
    #[serde(default)]
    pub auto_continue_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSection {
    /// Catalog snapshot used when a command is given no file. Empty for none.
    #[serde(default)]
    pub catalog_file: String,
    /// Load the built-in content schema for every activity type.
    #[serde(default = "default_true")]
    pub strict_schemas: bool,
}

/// Training configuration.
///
/// Serialized to/from TOML at `~/.config/casetrail/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub timer: TimerSection,
    #[serde(default)]
    pub scoring: ScoringSection,
    #[serde(default)]
    pub reveal: RevealSection,
    #[serde(default)]
    pub catalog: CatalogSection,
}

// Default functions
fn default_warning_percent() -> u32 {
    WARNING_PERCENT
}
fn default_critical_percent() -> u32 {
    CRITICAL_PERCENT
}
fn default_alert_dismiss_ms() -> u64 {
    ALERT_DISMISS_MS
}
fn default_completion_weight() -> f64 {
    0.4
}
fn default_speed_weight() -> f64 {
    0.4
}
fn default_accuracy_weight() -> f64 {
    0.2
}
fn default_reveal_delay_ms() -> u64 {
    500
}
fn default_details_delay_ms() -> u64 {
    1_000
}
fn default_complete_delay_ms() -> u64 {
    500
}
fn default_true() -> bool {
    true
}

impl Default for TimerSection {
    fn default() -> Self {
        Self {
            warning_percent: default_warning_percent(),
            critical_percent: default_critical_percent(),
            alert_dismiss_ms: default_alert_dismiss_ms(),
        }
    }
}

impl Default for ScoringSection {
    fn default() -> Self {
        Self {
            completion_weight: default_completion_weight(),
            speed_weight: default_speed_weight(),
            accuracy_weight: default_accuracy_weight(),
        }
    }
}

impl Default for RevealSection {
    fn default() -> Self {
        Self {
            reveal_delay_ms: default_reveal_delay_ms(),
            details_delay_ms: default_details_delay_ms(),
            complete_delay_ms: default_complete_delay_ms(),
            auto_continue_ms: 0,
        }
    }
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            catalog_file: String::new(),
            strict_schemas: true,
        }
    }
}

impl TrainingConfig {
    fn get_json_value_by_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(root: &mut Value, key: &str, value: &str) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                Value::Bool(_) => {
                    Value::Bool(value.parse::<bool>().map_err(|e| invalid(e.to_string()))?)
                }
                Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<f64>() {
                        serde_json::Number::from_f64(n)
                            .map(Value::Number)
                            .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as number")));
                    }
                }
                Value::Object(_) | Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a value by dot-separated key, keeping the field's type. Does not save.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// as the field's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Every leaf key with its value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
            match value {
                Value::Object(map) => {
                    for (key, child) in map {
                        let path = if prefix.is_empty() {
                            key.clone()
                        } else {
                            format!("{prefix}.{key}")
                        };
                        walk(&path, child, out);
                    }
                }
                Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }

        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out.sort();
        out
    }

    pub fn scoring_weights(&self) -> ScoringWeights {
        ScoringWeights {
            completion: self.scoring.completion_weight,
            speed: self.scoring.speed_weight,
            accuracy: self.scoring.accuracy_weight,
        }
    }

    pub fn reveal_config(&self) -> RevealConfig {
        RevealConfig {
            reveal_delay_ms: self.reveal.reveal_delay_ms,
            details_delay_ms: self.reveal.details_delay_ms,
            complete_delay_ms: self.reveal.complete_delay_ms,
            auto_continue_ms: (self.reveal.auto_continue_ms > 0)
                .then_some(self.reveal.auto_continue_ms),
        }
    }

    /// # Errors
    /// Returns an error if `duration` is zero or the thresholds are out of order.
    pub fn timer_config(&self, duration: u32) -> Result<TimerConfig, ValidationError> {
        TimerConfig::new(duration)?
            .with_thresholds(self.timer.warning_percent, self.timer.critical_percent)
    }

    /// Challenge parameters seeded from this config.
    ///
    /// # Errors
    /// Returns an error if `time_limit` is zero or the thresholds are out of order.
    pub fn challenge_config(
        &self,
        time_limit: u32,
        title: impl Into<String>,
    ) -> Result<ChallengeConfig, ValidationError> {
        let config = ChallengeConfig::new(time_limit, title)?
            .with_weights(self.scoring_weights())
            .with_reveal(self.reveal_config())
            .with_thresholds(self.timer.warning_percent, self.timer.critical_percent)
            .with_alert_dismiss(self.timer.alert_dismiss_ms);
        config.timer_config()?;
        Ok(config)
    }

    /// The configured catalog file, if any.
    pub fn catalog_file(&self) -> Option<PathBuf> {
        let file = self.catalog.catalog_file.trim();
        (!file.is_empty()).then(|| PathBuf::from(file))
    }
}
