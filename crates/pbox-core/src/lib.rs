//! HTTP surface of the playground: the version catalog, build scripts
//! served from the artifact cache, the example index, and static mounts.

use std::{io, sync::Arc};

use pbox_catalog::{
    Catalog, CatalogError, LocalCatalog, LookasideCache, OverrideTable, RemoteCatalogFetcher,
};
use pbox_store::{ArtifactStore, StoreError};
use thiserror::Error;
use tracing::debug;

mod config;
mod examples_index;
mod resolver;
mod server;
mod static_files;

pub use config::PlaygroundConfig;
pub use examples_index::{scan_examples, ExampleEntry, ExampleGroups};
pub use resolver::{BuildResolver, ResolveError, ResolvedBuild, ORIGIN_HEADER};
pub use server::{router, run};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to bind {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("server failed: {0}")]
    Serve(#[source] io::Error),
}

/// Shared state behind every request.
#[derive(Debug)]
pub struct Playground {
    config: PlaygroundConfig,
    resolver: BuildResolver,
}

impl Playground {
    /// Load the override table and lookaside cache, then wire the catalog
    /// and artifact store together.
    ///
    /// # Errors
    ///
    /// Returns an error if the override document is unreadable or an HTTP
    /// client cannot be built.
    pub fn from_config(config: PlaygroundConfig) -> Result<Arc<Self>, CoreError> {
        let overrides = OverrideTable::load(&config.builds_config)?;
        debug!(entries = overrides.entries().len(), "loaded build overrides");
        let lookaside = Arc::new(LookasideCache::load(config.lookaside_path()));
        let remote =
            RemoteCatalogFetcher::new(config.remote.clone(), lookaside, config.catalog_timeout)?;
        let local = LocalCatalog::new(&config.local_builds, config.lib());
        let catalog = Catalog::new(local, remote, overrides);
        let store = ArtifactStore::with_timeout(config.artifact_dir(), config.download_timeout)?;

        Ok(Arc::new(Self {
            resolver: BuildResolver::new(catalog, store),
            config,
        }))
    }

    #[must_use]
    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    #[must_use]
    pub fn resolver(&self) -> &BuildResolver {
        &self.resolver
    }
}
