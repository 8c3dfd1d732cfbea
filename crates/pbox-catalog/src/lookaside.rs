use std::{
    fs, io,
    io::Write,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{BuildDescriptor, CatalogError};

/// How long a fetched remote catalog is trusted without a refresh attempt.
pub const STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// File name of the lookaside record inside the cache directory.
pub const LOOKASIDE_FILE: &str = "git_api_cache";

/// Last successfully fetched remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "remote_builds")]
    pub builds: Vec<BuildDescriptor>,
    /// Unix time in milliseconds.
    #[serde(rename = "remote_builds_fetched_at")]
    pub fetched_at: u64,
}

impl CatalogRecord {
    #[must_use]
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        let stale_at = self
            .fetched_at
            .saturating_add(u64::try_from(STALE_AFTER.as_millis()).unwrap_or(u64::MAX));
        unix_millis(now) <= stale_at
    }
}

/// Persisted cache of remote build information.
///
/// The record is a pure cache: writers racing to refresh it simply overwrite
/// each other. The lock only guards the in-memory copy and is never held
/// across I/O with the remote source.
#[derive(Debug)]
pub struct LookasideCache {
    path: Option<PathBuf>,
    record: Mutex<Option<CatalogRecord>>,
}

impl LookasideCache {
    /// Cache that is never written to disk.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            record: Mutex::new(None),
        }
    }

    /// Load the record stored at `path`. Missing or unreadable records start
    /// empty.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let record = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<CatalogRecord>(&contents) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(%err, path = %path.display(), "ignoring corrupt remote build cache");
                    None
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(%err, path = %path.display(), "unable to read remote build cache");
                None
            }
        };
        debug!(
            path = %path.display(),
            cached = record.as_ref().map_or(0, |r| r.builds.len()),
            "loaded remote build cache"
        );
        Self {
            path: Some(path),
            record: Mutex::new(record),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<CatalogRecord> {
        self.lock().clone()
    }

    /// Replace the in-memory record.
    pub fn store(&self, builds: Vec<BuildDescriptor>, fetched_at: SystemTime) {
        *self.lock() = Some(CatalogRecord {
            builds,
            fetched_at: unix_millis(fetched_at),
        });
    }

    /// Write the current record to disk by atomic rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    pub fn save(&self) -> Result<(), CatalogError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let Some(record) = self.snapshot() else {
            return Ok(());
        };
        let io_err = |source: io::Error| CatalogError::Io {
            path: path.clone(),
            source,
        };
        let payload = serde_json::to_vec(&record).map_err(|err| io_err(io::Error::other(err)))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = tempfile::Builder::new()
            .prefix("_")
            .tempfile_in(dir)
            .map_err(io_err)?;
        tmp.write_all(&payload).map_err(io_err)?;
        tmp.persist(path).map_err(|err| io_err(err.error))?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<CatalogRecord>> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}
