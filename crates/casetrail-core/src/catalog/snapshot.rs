//! Catalog export/import format.
//!
//! A snapshot is the persisted layout of the whole catalog. Imports are
//! gated on a semver check: a different major version is rejected, a newer
//! minor version is accepted with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Activity, Badge, Module};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub modules: Vec<Module>,
    /// Flattened index of every module's activities. Modules stay authoritative.
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub badges: Vec<Badge>,
    pub exported_at: DateTime<Utc>,
    pub version: String,
}

impl CatalogSnapshot {
    pub fn new(modules: Vec<Module>, badges: Vec<Badge>) -> Self {
        let activities = modules.iter().flat_map(|m| m.activities.iter().cloned()).collect();
        Self {
            modules,
            activities,
            badges,
            exported_at: Utc::now(),
            version: SNAPSHOT_VERSION.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
    Compatible,
    /// Newer minor version; fields added since may be ignored.
    MinorNewer { current: String, import: String },
    Incompatible { current: String, import: String },
}

pub fn parse_version(version: &str) -> Option<(u32, u32, u32)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((major, minor, patch))
}

pub fn check_compatibility(current: &str, import: &str) -> Compatibility {
    let incompatible = || Compatibility::Incompatible {
        current: current.to_string(),
        import: import.to_string(),
    };
    let (Some(cur), Some(imp)) = (parse_version(current), parse_version(import)) else {
        return incompatible();
    };
    if cur.0 != imp.0 {
        incompatible()
    } else if imp.1 > cur.1 {
        Compatibility::MinorNewer {
            current: current.to_string(),
            import: import.to_string(),
        }
    } else {
        Compatibility::Compatible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_rules() {
        assert_eq!(check_compatibility("1.0.0", "1.0.7"), Compatibility::Compatible);
        assert_eq!(check_compatibility("1.2.0", "1.1.0"), Compatibility::Compatible);
        assert!(matches!(check_compatibility("1.0.0", "1.3.0"), Compatibility::MinorNewer { .. }));
        assert!(matches!(
            check_compatibility("1.0.0", "2.0.0"),
            Compatibility::Incompatible { .. }
        ));
        assert!(matches!(check_compatibility("1.0.0", "v1"), Compatibility::Incompatible { .. }));
    }

    #[test]
    fn parse_requires_three_parts() {
        assert_eq!(parse_version("1.2.3"), Some((1, 2, 3)));
        assert_eq!(parse_version("1.2"), None);
        assert_eq!(parse_version("1.2.3.4"), None);
    }

    #[test]
    fn empty_snapshot_round_trips_through_json() {
        let snapshot = CatalogSnapshot::new(Vec::new(), Vec::new());
        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"exportedAt\""));
        assert_eq!(CatalogSnapshot::from_json(&json).unwrap(), snapshot);
    }
}
