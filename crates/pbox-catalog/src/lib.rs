//! Build catalog: which library versions the playground can serve.
//!
//! Local builds are discovered on disk, remote builds come from the hosting
//! API (with a lookaside cache to ride out failures), and an operator
//! override table relabels, hides, or injects entries before the list is
//! ordered for clients.

use std::{path::PathBuf, sync::Arc};

use thiserror::Error;

mod descriptor;
mod local;
mod lookaside;
mod overrides;
mod reconcile;
mod remote;

pub use descriptor::{BuildDescriptor, BuildKind};
pub use local::{parse_local_token, LocalBuild, LocalCatalog, LOCAL_NAME};
pub use lookaside::{CatalogRecord, LookasideCache, LOOKASIDE_FILE, STALE_AFTER};
pub use overrides::{BuildOverride, OverrideTable};
pub use reconcile::reconcile;
pub use remote::{RemoteCatalogFetcher, RemoteError, RemoteSource, DEFAULT_CATALOG_TIMEOUT};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid build override file {}: {source}", path.display())]
    Overrides {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("local build scan aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Everything needed to answer "which builds exist right now".
#[derive(Debug, Clone)]
pub struct Catalog {
    local: LocalCatalog,
    remote: RemoteCatalogFetcher,
    overrides: Arc<OverrideTable>,
}

impl Catalog {
    #[must_use]
    pub fn new(local: LocalCatalog, remote: RemoteCatalogFetcher, overrides: OverrideTable) -> Self {
        Self {
            local,
            remote,
            overrides: Arc::new(overrides),
        }
    }

    #[must_use]
    pub fn local(&self) -> &LocalCatalog {
        &self.local
    }

    #[must_use]
    pub fn remote(&self) -> &RemoteCatalogFetcher {
        &self.remote
    }

    /// Scan local builds and query remote builds concurrently, then reconcile.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local builds directory exists but cannot
    /// be read. Remote failures fall back to cached data.
    pub async fn builds(&self) -> Result<Vec<BuildDescriptor>, CatalogError> {
        let local = self.local.clone();
        let (local, remote) = tokio::join!(
            tokio::task::spawn_blocking(move || local.descriptors()),
            self.remote.fetch_remote()
        );
        Ok(reconcile(local??, remote, &self.overrides))
    }

    /// Exact-name lookup in the reconciled catalog.
    ///
    /// # Errors
    ///
    /// See [`Catalog::builds`].
    pub async fn find(&self, name: &str) -> Result<Option<BuildDescriptor>, CatalogError> {
        Ok(self
            .builds()
            .await?
            .into_iter()
            .find(|build| build.name == name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn merges_local_remote_and_overrides() -> anyhow::Result<()> {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/repos/o/lib/branches"))
                .respond_with(json_encoded(json!([
                    { "name": "master", "commit": { "sha": "m1" } }
                ]))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/repos/o/lib/git/refs/tags"))
                .respond_with(json_encoded(json!([
                    { "ref": "refs/tags/v2.4.0", "object": { "sha": "t1" } },
                    { "ref": "refs/tags/v2.3.0", "object": { "sha": "t2" } }
                ]))),
        );

        let temp = tempfile::tempdir()?;
        std::fs::write(temp.path().join("phaser.js"), "local")?;
        let source = RemoteSource {
            api_base: server.url_str(""),
            repo: "o/lib".into(),
            cdn_base: "https://cdn.example".into(),
            lib: "phaser".into(),
        };
        let remote = RemoteCatalogFetcher::new(
            source,
            Arc::new(LookasideCache::in_memory()),
            Duration::from_secs(5),
        )?;
        let overrides = OverrideTable::new(vec![BuildOverride {
            obsolete: Some(true),
            ..BuildOverride::named("v2.4.0")
        }]);
        let catalog = Catalog::new(LocalCatalog::new(temp.path(), "phaser"), remote, overrides);

        let builds = catalog.builds().await?;
        let names: Vec<&str> = builds.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["local", "master", "v2.3.0"]);

        let found = catalog.find("v2.3.0").await?.expect("tag present");
        assert_eq!(found.sha.as_deref(), Some("t2"));
        assert!(catalog.find("v2.4.0").await?.is_none());
        Ok(())
    }
}
