use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a build comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildKind {
    Local,
    Branch,
    Tag,
    /// Synthetic entry with a direct URL, usually injected by the override table.
    #[default]
    Remote,
}

/// One servable version of the library.
///
/// `name` is the token clients request. `sha` is only present for git-derived
/// builds and is what keeps their cache path stable while branches move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: BuildKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obsolete: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BuildDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: BuildKind) -> Self {
        Self {
            name: name.into(),
            sha: None,
            kind,
            url: None,
            obsolete: None,
            license: None,
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn local(name: impl Into<String>) -> Self {
        Self::new(name, BuildKind::Local)
    }

    #[must_use]
    pub fn git(
        name: impl Into<String>,
        kind: BuildKind,
        sha: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            sha: Some(sha.into()),
            url: Some(url.into()),
            ..Self::new(name, kind)
        }
    }

    #[must_use]
    pub fn is_obsolete(&self) -> bool {
        self.obsolete.unwrap_or(false)
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.kind == BuildKind::Local
    }

    #[must_use]
    pub fn is_branch(&self) -> bool {
        self.kind == BuildKind::Branch
    }
}
