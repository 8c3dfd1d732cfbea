use std::{collections::BTreeMap, fs, io, path::Path};

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::{BuildDescriptor, BuildKind, CatalogError};

/// One entry of the operator-maintained build list. Every field that is set
/// replaces the discovered value.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildOverride {
    pub name: String,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<BuildKind>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub obsolete: Option<bool>,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BuildOverride {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Shallow-copy the set fields onto `build`.
    pub fn apply_to(&self, build: &mut BuildDescriptor) {
        build.name.clone_from(&self.name);
        if let Some(sha) = &self.sha {
            build.sha = Some(sha.clone());
        }
        if let Some(kind) = self.kind {
            build.kind = kind;
        }
        if let Some(url) = &self.url {
            build.url = Some(url.clone());
        }
        if let Some(obsolete) = self.obsolete {
            build.obsolete = Some(obsolete);
        }
        if let Some(license) = &self.license {
            build.license = Some(license.clone());
        }
        for (key, value) in &self.extra {
            build.extra.insert(key.clone(), value.clone());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OverrideTable {
    #[serde(default)]
    builds: Vec<BuildOverride>,
}

impl OverrideTable {
    #[must_use]
    pub fn new(builds: Vec<BuildOverride>) -> Self {
        Self { builds }
    }

    /// Load `{ "builds": [...] }` from disk. A missing file is an empty table.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no build override file");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(CatalogError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents).map_err(|source| CatalogError::Overrides {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn entries(&self) -> &[BuildOverride] {
        &self.builds
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builds.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unset_fields_keep_discovered_values() {
        let mut build = BuildDescriptor::git("v2.1.0", BuildKind::Tag, "abc", "https://cdn/x.js");
        let entry = BuildOverride {
            license: Some("commercial".into()),
            ..BuildOverride::named("v2.1.0")
        };
        entry.apply_to(&mut build);
        assert_eq!(build.license.as_deref(), Some("commercial"));
        assert_eq!(build.sha.as_deref(), Some("abc"));
        assert_eq!(build.kind, BuildKind::Tag);
    }

    #[test]
    fn loads_table_and_tolerates_missing_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let missing = OverrideTable::load(&temp.path().join("absent.json"))?;
        assert!(missing.is_empty());

        let path = temp.path().join("phaser_builds.json");
        fs::write(
            &path,
            serde_json::to_string(&json!({
                "builds": [
                    { "name": "v2.4.0", "obsolete": true },
                    { "name": "2.2.2.box2d.min", "url": "http://examples.phaser.io/b.js", "note": "bundled" }
                ]
            }))?,
        )?;
        let table = OverrideTable::load(&path)?;
        assert_eq!(table.entries().len(), 2);
        assert_eq!(table.entries()[0].obsolete, Some(true));
        assert_eq!(table.entries()[1].extra.get("note"), Some(&json!("bundled")));
        Ok(())
    }

    #[test]
    fn malformed_table_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("phaser_builds.json");
        fs::write(&path, "{ builds: ")?;
        assert!(matches!(
            OverrideTable::load(&path),
            Err(CatalogError::Overrides { .. })
        ));
        Ok(())
    }
}
