use std::{
    io,
    path::{Path, PathBuf},
};

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use pbox_catalog::{parse_local_token, BuildDescriptor, Catalog, CatalogError};
use pbox_store::{artifact_rel_path, ArtifactStore, StoreError};
use thiserror::Error;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

/// Response header naming where a served build really came from.
pub const ORIGIN_HEADER: &str = "x-origin-resource";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown version: {0}")]
    UnknownVersion(String),
    #[error("failed to read local build {version}: {source}")]
    LocalRead {
        version: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("build {0} has no download url")]
    MissingUrl(String),
    #[error("failed to fetch build {version}: {source}")]
    Download {
        version: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to read cached build {version}: {source}")]
    CachedRead {
        version: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl ResolveError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::UnknownVersion(_) | Self::LocalRead { .. } => StatusCode::NOT_FOUND,
            Self::MissingUrl(_) | Self::Download { .. } => StatusCode::BAD_GATEWAY,
            Self::CachedRead { .. } | Self::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Where the bytes for a requested version live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedBuild {
    Local { path: PathBuf },
    Cached { path: PathBuf, origin: String, fetched: bool },
}

impl ResolvedBuild {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Local { path } | Self::Cached { path, .. } => path,
        }
    }

    #[must_use]
    pub fn origin(&self) -> Option<&str> {
        match self {
            Self::Local { .. } => None,
            Self::Cached { origin, .. } => Some(origin),
        }
    }
}

/// Turns a requested version token into a readable script.
#[derive(Debug, Clone)]
pub struct BuildResolver {
    catalog: Catalog,
    store: ArtifactStore,
}

impl BuildResolver {
    #[must_use]
    pub fn new(catalog: Catalog, store: ArtifactStore) -> Self {
        Self { catalog, store }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The reconciled catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if local builds cannot be listed.
    pub async fn versions(&self) -> Result<Vec<BuildDescriptor>, ResolveError> {
        Ok(self.catalog.builds().await?)
    }

    /// Locate the file for `version`, downloading it into the cache first if
    /// it is a remote build that has not been fetched yet.
    ///
    /// Local tokens never consult the catalog. Unknown versions fail before
    /// the cache is touched.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::UnknownVersion`] for names outside the catalog
    /// and a download error when the artifact cannot be cached.
    pub async fn resolve(&self, version: &str) -> Result<ResolvedBuild, ResolveError> {
        if let Some(suffix) = parse_local_token(version) {
            let local = self.catalog.local().clone();
            let suffix = suffix.map(str::to_owned);
            let path = tokio::task::spawn_blocking(move || local.resolve(suffix.as_deref()))
                .await
                .map_err(CatalogError::from)?
                .ok_or_else(|| ResolveError::UnknownVersion(version.to_string()))?;
            return Ok(ResolvedBuild::Local { path });
        }

        let build = self
            .catalog
            .find(version)
            .await?
            .ok_or_else(|| ResolveError::UnknownVersion(version.to_string()))?;
        let url = build
            .url
            .clone()
            .ok_or_else(|| ResolveError::MissingUrl(build.name.clone()))?;
        let lib = &self.catalog.remote().source().lib;
        let relative = artifact_rel_path(&build.name, build.sha.as_deref(), lib);
        let artifact = self
            .store
            .ensure(&relative, &url)
            .await
            .map_err(|source| ResolveError::Download {
                version: version.to_string(),
                source,
            })?;
        Ok(ResolvedBuild::Cached {
            path: artifact.path,
            origin: url,
            fetched: artifact.fetched,
        })
    }

    /// Resolve `version` and stream it as a script response.
    ///
    /// # Errors
    ///
    /// See [`BuildResolver::resolve`]; read failures are reported per source.
    pub async fn serve(&self, version: &str) -> Result<Response, ResolveError> {
        let build = self.resolve(version).await?;
        let path = build.path();
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(source) => {
                warn!(%source, path = %path.display(), "failed to read build");
                return Err(match build {
                    ResolvedBuild::Local { path } => ResolveError::LocalRead {
                        version: version.to_string(),
                        path,
                        source,
                    },
                    ResolvedBuild::Cached { .. } => ResolveError::CachedRead {
                        version: version.to_string(),
                        source,
                    },
                });
            }
        };

        match &build {
            ResolvedBuild::Local { path } => info!(path = %path.display(), "serving local build"),
            ResolvedBuild::Cached { path, .. } => {
                debug!(path = %path.display(), "serving cached build");
            }
        }

        let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/javascript; charset=utf-8"),
        );
        if let Some(origin) = build.origin() {
            if let Ok(value) = HeaderValue::from_str(origin) {
                headers.insert(ORIGIN_HEADER, value);
            }
        }
        Ok(response)
    }
}
