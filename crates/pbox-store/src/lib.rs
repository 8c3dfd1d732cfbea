//! Filesystem-backed artifact cache for library builds.
//!
//! Artifacts live at deterministic paths under the cache root. Presence of a
//! file at its final path is the only record of "already cached": there is no
//! index, and nothing is ever evicted.

use std::{
    env,
    path::{Component, Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Result};
use dirs_next::home_dir;
use reqwest::Client;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("pbox-store/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache path `{0}` must be relative and stay inside the cache root")]
    InvalidPath(String),
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install {}: {source}", path.display())]
    Install {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
}

/// A file that is fully present at its final cache path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub path: PathBuf,
    /// `true` when this call downloaded the file, `false` on a cache hit.
    pub fetched: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    client: Client,
}

impl ArtifactStore {
    /// Opens a store rooted at `root` with the default download timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::with_timeout(root, DEFAULT_DOWNLOAD_TIMEOUT)
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn with_timeout(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            root: root.into(),
            client: http_client(timeout)?,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final location of `relative` inside the cache, whether or not it exists yet.
    ///
    /// # Errors
    ///
    /// Rejects absolute paths and paths that climb out of the root.
    pub fn path_for(&self, relative: &str) -> Result<PathBuf, StoreError> {
        let rel = Path::new(relative);
        if relative.is_empty() {
            return Err(StoreError::InvalidPath(relative.to_string()));
        }
        for comp in rel.components() {
            if !matches!(comp, Component::Normal(_)) {
                return Err(StoreError::InvalidPath(relative.to_string()));
            }
        }
        Ok(self.root.join(rel))
    }

    /// Ensure `relative` is cached, downloading it from `url` when absent.
    ///
    /// A hit performs no network access. A miss streams the body into a
    /// uniquely named temporary file in the cache root and renames it into
    /// place, so the final path is either absent or complete. Concurrent
    /// misses for the same path may each download; the last rename wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the download or the install step fails. The
    /// temporary file is removed in every failure case, including when the
    /// returned future is dropped mid-download.
    pub async fn ensure(&self, relative: &str, url: &str) -> Result<CachedArtifact, StoreError> {
        let dest = self.path_for(relative)?;
        if tokio::fs::metadata(&dest).await.is_ok() {
            debug!(path = %dest.display(), "artifact cache hit");
            return Ok(CachedArtifact {
                path: dest,
                fetched: false,
            });
        }

        info!(path = %dest.display(), %url, "downloading artifact");
        match self.download(&dest, url).await {
            Ok(()) => {
                debug!(path = %dest.display(), "artifact downloaded");
                Ok(CachedArtifact {
                    path: dest,
                    fetched: true,
                })
            }
            Err(err) => {
                warn!(%err, %url, "unable to download artifact");
                Err(err)
            }
        }
    }

    async fn download(&self, dest: &Path, url: &str) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Write {
                path: self.root.clone(),
                source,
            })?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| StoreError::Fetch {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Dropping `tmp` on any early return (or cancellation) deletes it.
        let tmp = tempfile::Builder::new()
            .prefix("_")
            .tempfile_in(&self.root)
            .map_err(|source| StoreError::Write {
                path: self.root.clone(),
                source,
            })?;
        let write_err = |source: std::io::Error| StoreError::Write {
            path: tmp.path().to_path_buf(),
            source,
        };
        let mut file = tokio::fs::File::from_std(tmp.as_file().try_clone().map_err(write_err)?);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|source| StoreError::Fetch {
                url: url.to_string(),
                source,
            })?
        {
            file.write_all(&chunk).await.map_err(write_err)?;
        }
        file.flush().await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        install(tmp, dest)
    }
}

fn install(tmp: NamedTempFile, dest: &Path) -> Result<(), StoreError> {
    match tmp.persist(dest) {
        Ok(_) => Ok(()),
        Err(err) => {
            // The temp file is removed when `err.file` drops. A concurrent
            // writer may already have installed the same artifact.
            let source = err.error;
            drop(err.file);
            if dest.exists() {
                Ok(())
            } else {
                Err(StoreError::Install {
                    path: dest.to_path_buf(),
                    source,
                })
            }
        }
    }
}

/// Cache-relative path for a build: `<name>/<lib>-<sha>.js`, or
/// `<name>/<lib>.js` when there is no commit hash.
///
/// Each segment is escaped injectively, so distinct names never share a path.
#[must_use]
pub fn artifact_rel_path(name: &str, sha: Option<&str>, lib: &str) -> String {
    let dir = path_safe(name);
    match sha {
        Some(sha) => format!("{dir}/{}-{}.js", path_safe(lib), path_safe(sha)),
        None => format!("{dir}/{}.js", path_safe(lib)),
    }
}

/// Percent-escape everything outside `[A-Za-z0-9._-]`, plus a leading `.`
/// or `_` (temp files own the `_` prefix).
fn path_safe(raw: &str) -> String {
    use std::fmt::Write as _;

    if raw.is_empty() {
        return "%".to_string();
    }
    let mut out = String::with_capacity(raw.len());
    for (index, byte) in raw.bytes().enumerate() {
        let plain = byte.is_ascii_alphanumeric()
            || byte == b'-'
            || (matches!(byte, b'.' | b'_') && index > 0);
        if plain {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct CacheLocation {
    pub path: PathBuf,
    pub source: &'static str,
}

/// Determine the cache root: `PBOX_CACHE_PATH`, then the platform cache dir.
///
/// # Errors
///
/// Returns an error if no home directory can be determined.
pub fn resolve_cache_store_path() -> Result<CacheLocation> {
    if let Some(override_path) = env::var_os("PBOX_CACHE_PATH") {
        let path = absolutize(PathBuf::from(override_path))?;
        return Ok(CacheLocation {
            path,
            source: "PBOX_CACHE_PATH",
        });
    }

    #[cfg(target_os = "windows")]
    let (base, source) = resolve_windows_cache_base()?;
    #[cfg(not(target_os = "windows"))]
    let (base, source) = resolve_unix_cache_base()?;

    Ok(CacheLocation {
        path: base.join("pbox"),
        source,
    })
}

#[cfg(not(target_os = "windows"))]
fn resolve_unix_cache_base() -> Result<(PathBuf, &'static str)> {
    if let Some(xdg) = env::var_os("XDG_CACHE_HOME") {
        return Ok((PathBuf::from(xdg), "XDG_CACHE_HOME"));
    }
    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok((home.join(".cache"), "~/.cache"))
}

#[cfg(target_os = "windows")]
fn resolve_windows_cache_base() -> Result<(PathBuf, &'static str)> {
    if let Some(local) = env::var_os("LOCALAPPDATA") {
        return Ok((PathBuf::from(local), "LOCALAPPDATA"));
    }
    let home = home_dir().ok_or_else(|| anyhow!("unable to determine home directory"))?;
    Ok((home.join("AppData").join("Local"), "home/AppData/Local"))
}

/// Anchor a relative path at the current directory.
///
/// # Errors
///
/// Returns an error if the current directory cannot be read.
pub fn absolutize(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(env::current_dir()?.join(path))
    }
}

fn http_client(timeout: Duration) -> Result<Client, StoreError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(StoreError::Client)
}
