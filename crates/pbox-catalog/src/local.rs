use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{BuildDescriptor, CatalogError};

/// Reserved name of the default local build.
pub const LOCAL_NAME: &str = "local";

/// Split a requested version token into its local suffix.
///
/// `local` yields `Some(None)`, `local.<suffix>` yields `Some(Some(suffix))`,
/// and any other token is not local.
#[must_use]
pub fn parse_local_token(token: &str) -> Option<Option<&str>> {
    if token == LOCAL_NAME {
        return Some(None);
    }
    token
        .strip_prefix(LOCAL_NAME)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(Some)
}

/// A locally built library found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalBuild {
    pub descriptor: BuildDescriptor,
    pub path: PathBuf,
}

/// Scanner for the local-builds directory.
///
/// Recognised layouts, for library `lib`:
/// - `<lib>.js` is the build named `local`
/// - `<lib>-<tag>.js` is `local.<tag>`
/// - `<dir>/<lib>.js` is `local.<dir>`
#[derive(Debug, Clone)]
pub struct LocalCatalog {
    root: PathBuf,
    lib: String,
}

impl LocalCatalog {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, lib: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            lib: lib.into(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate local builds, sorted by name. A missing directory has none.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn scan(&self) -> Result<Vec<LocalBuild>, CatalogError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "no local builds directory");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(CatalogError::Io {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut builds = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CatalogError::Io {
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if path.is_dir() {
                let entry_file = path.join(format!("{}.js", self.lib));
                if entry_file.is_file() {
                    builds.push(LocalBuild {
                        descriptor: BuildDescriptor::local(format!("{LOCAL_NAME}.{file_name}")),
                        path: entry_file,
                    });
                }
            } else if let Some(name) = self.match_file(&file_name) {
                builds.push(LocalBuild {
                    descriptor: BuildDescriptor::local(name),
                    path,
                });
            } else {
                debug!(entry = %file_name, "skipping unrecognised local build entry");
            }
        }
        builds.sort_by(|a, b| a.descriptor.name.cmp(&b.descriptor.name));
        Ok(builds)
    }

    /// Descriptors for every local build.
    ///
    /// # Errors
    ///
    /// See [`LocalCatalog::scan`].
    pub fn descriptors(&self) -> Result<Vec<BuildDescriptor>, CatalogError> {
        Ok(self.scan()?.into_iter().map(|b| b.descriptor).collect())
    }

    /// File to serve for a local token suffix.
    ///
    /// A scanned build with the matching name wins. Otherwise the
    /// conventional location is returned even if it does not exist, so the
    /// caller's read reports the failing path. `None` means the suffix could
    /// escape the local root.
    #[must_use]
    pub fn resolve(&self, suffix: Option<&str>) -> Option<PathBuf> {
        if let Some(suffix) = suffix {
            if suffix.is_empty()
                || suffix == "."
                || suffix == ".."
                || suffix.contains(['/', '\\'])
            {
                return None;
            }
        }

        let name = match suffix {
            Some(suffix) => format!("{LOCAL_NAME}.{suffix}"),
            None => LOCAL_NAME.to_string(),
        };
        if let Ok(builds) = self.scan() {
            if let Some(found) = builds.into_iter().find(|b| b.descriptor.name == name) {
                return Some(found.path);
            }
        }

        Some(match suffix {
            None => self.root.join(format!("{}.js", self.lib)),
            Some(suffix) => {
                let dir = self.root.join(suffix);
                if dir.is_dir() {
                    dir.join(format!("{}.js", self.lib))
                } else {
                    self.root.join(format!("{}-{suffix}.js", self.lib))
                }
            }
        })
    }

    fn match_file(&self, file_name: &str) -> Option<String> {
        let lowered = file_name.to_ascii_lowercase();
        let stem_len = lowered.strip_suffix(".js")?.len();
        let lib = self.lib.to_ascii_lowercase();
        let stem = &file_name[..stem_len];
        if stem.eq_ignore_ascii_case(&lib) {
            return Some(LOCAL_NAME.to_string());
        }
        let tag = stem
            .get(lib.len()..)
            .filter(|_| stem[..lib.len()].eq_ignore_ascii_case(&lib))?
            .strip_prefix('-')?;
        if tag.is_empty() {
            return None;
        }
        Some(format!("{LOCAL_NAME}.{tag}"))
    }
}
