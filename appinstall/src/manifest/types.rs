//! Manifest document types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// How an application is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    /// Code is served remotely; installing only needs the manifest.
    Hosted,
    /// Code ships as an archive that must be downloaded in full.
    Packaged,
}

impl AppKind {
    /// Get a lowercase name for the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hosted => "hosted",
            Self::Packaged => "packaged",
        }
    }
}

impl fmt::Display for AppKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Application developer block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Developer {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Application manifest.
///
/// The same shape serves both the full manifest of a hosted app and the
/// package manifest of a packaged app; the latter must carry `package_path`.
/// Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Display name. Required.
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Free-form version string; manifests do not follow semver.
    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub developer: Option<Developer>,

    #[serde(default)]
    pub launch_path: Option<String>,

    /// Icon paths keyed by pixel size (`"128": "/icons/128.png"`).
    #[serde(default)]
    pub icons: BTreeMap<String, String>,

    /// Archive location, relative to the manifest URL. Packaged apps only.
    #[serde(default)]
    pub package_path: Option<String>,

    /// Archive size in bytes, when the package manifest declares it.
    #[serde(default)]
    pub size: Option<u64>,

    /// Security level (`web`, `privileged`, `certified`).
    #[serde(default, rename = "type")]
    pub app_type: Option<String>,

    /// Special role such as `input` or `homescreen`.
    #[serde(default)]
    pub role: Option<String>,
}

impl Manifest {
    /// Path of the largest declared icon.
    ///
    /// Keys that are not numeric sizes are ignored.
    pub fn largest_icon(&self) -> Option<&str> {
        self.icons
            .iter()
            .filter_map(|(size, path)| size.parse::<u32>().ok().map(|s| (s, path)))
            .max_by_key(|(size, _)| *size)
            .map(|(_, path)| path.as_str())
    }

    /// Check the fields the given kind of install depends on.
    pub fn validate(&self, kind: AppKind) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("missing application name".to_string());
        }

        if kind == AppKind::Packaged {
            match self.package_path.as_deref() {
                Some(path) if !path.trim().is_empty() => {}
                _ => return Err("package manifest has no package_path".to_string()),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest_with_icons(icons: &[(&str, &str)]) -> Manifest {
        Manifest {
            name: "Clock".to_string(),
            icons: icons
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_largest_icon_compares_numerically() {
        let manifest = manifest_with_icons(&[
            ("60", "/icons/60.png"),
            ("128", "/icons/128.png"),
            ("90", "/icons/90.png"),
        ]);
        assert_eq!(manifest.largest_icon(), Some("/icons/128.png"));
    }

    #[test]
    fn test_largest_icon_skips_non_numeric_keys() {
        let manifest = manifest_with_icons(&[("large", "/big.png"), ("16", "/16.png")]);
        assert_eq!(manifest.largest_icon(), Some("/16.png"));
        assert_eq!(manifest_with_icons(&[]).largest_icon(), None);
    }

    #[test]
    fn test_validate_requires_name() {
        let manifest = Manifest {
            name: "  ".to_string(),
            ..Default::default()
        };
        assert!(manifest.validate(AppKind::Hosted).is_err());
    }

    #[test]
    fn test_validate_packaged_requires_package_path() {
        let mut manifest = Manifest {
            name: "Clock".to_string(),
            ..Default::default()
        };
        assert!(manifest.validate(AppKind::Hosted).is_ok());
        assert!(manifest.validate(AppKind::Packaged).is_err());

        manifest.package_path = Some("clock.zip".to_string());
        assert!(manifest.validate(AppKind::Packaged).is_ok());
    }

    #[test]
    fn test_deserialize_ignores_unknown_fields() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"name":"Clock","type":"privileged","size":1024,"permissions":{"alarms":{}}}"#,
        )
        .unwrap();
        assert_eq!(manifest.app_type.as_deref(), Some("privileged"));
        assert_eq!(manifest.size, Some(1024));
    }
}
