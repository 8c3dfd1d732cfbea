use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use reqwest::{header, Client};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{lookaside::LookasideCache, BuildDescriptor, BuildKind, CatalogError};

const USER_AGENT: &str = concat!("pbox/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_CATALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Where remote builds are listed and downloaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSource {
    pub api_base: String,
    pub repo: String,
    pub cdn_base: String,
    pub lib: String,
}

impl Default for RemoteSource {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
            repo: "photonstorm/phaser".to_string(),
            cdn_base: "https://cdn.rawgit.com".to_string(),
            lib: "phaser".to_string(),
        }
    }
}

impl RemoteSource {
    fn branches_url(&self) -> String {
        format!(
            "{}/repos/{}/branches?per_page=100",
            self.api_base.trim_end_matches('/'),
            self.repo
        )
    }

    fn tags_url(&self) -> String {
        format!(
            "{}/repos/{}/git/refs/tags?per_page=100",
            self.api_base.trim_end_matches('/'),
            self.repo
        )
    }

    /// Artifact URL pinned to a commit, so moving branches never serve stale bytes.
    #[must_use]
    pub fn build_url(&self, sha: &str) -> String {
        format!(
            "{}/{}/{sha}/build/{}.js",
            self.cdn_base.trim_end_matches('/'),
            self.repo,
            self.lib
        )
    }
}

/// Why a refresh of the remote catalog failed. Never surfaced to clients.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned {status}")]
    Status { url: String, status: u16 },
    #[error("invalid payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Deserialize)]
struct BranchItem {
    name: String,
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TagRefItem {
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    object: CommitRef,
}

/// Queries the hosting API for branches and tags.
#[derive(Debug, Clone)]
pub struct RemoteCatalogFetcher {
    client: Client,
    source: RemoteSource,
    cache: Arc<LookasideCache>,
    refreshing: Arc<AtomicBool>,
}

impl RemoteCatalogFetcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        source: RemoteSource,
        cache: Arc<LookasideCache>,
        timeout: Duration,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(CatalogError::Client)?;
        Ok(Self {
            client,
            source,
            cache,
            refreshing: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn source(&self) -> &RemoteSource {
        &self.source
    }

    #[must_use]
    pub fn cache(&self) -> &LookasideCache {
        &self.cache
    }

    /// Remote builds, or the last known good list when the remote is unavailable.
    pub async fn fetch_remote(&self) -> Vec<BuildDescriptor> {
        self.fetch_remote_at(SystemTime::now()).await
    }

    /// Like [`RemoteCatalogFetcher::fetch_remote`] with an explicit clock.
    ///
    /// A fresh record is returned without touching the network. A stale
    /// record is returned immediately while a background task refreshes it.
    /// Only a missing record makes the caller wait for the remote; if that
    /// fails the list is empty.
    pub async fn fetch_remote_at(&self, now: SystemTime) -> Vec<BuildDescriptor> {
        match self.cache.snapshot() {
            Some(record) if record.is_fresh(now) => {
                debug!(builds = record.builds.len(), "using cached remote build information");
                record.builds
            }
            Some(record) => {
                self.spawn_refresh(now);
                record.builds
            }
            None => match self.refresh(now).await {
                Ok(builds) => builds,
                Err(err) => {
                    warn!(%err, "failed to get remote build information");
                    Vec::new()
                }
            },
        }
    }

    /// Query the remote and replace the lookaside record.
    ///
    /// # Errors
    ///
    /// Returns an error if either query fails; the record is left untouched.
    pub async fn refresh(&self, now: SystemTime) -> Result<Vec<BuildDescriptor>, RemoteError> {
        info!("updating remote build information");
        let builds = self.fetch_collections().await?;
        info!(builds = builds.len(), "caching remote build information");
        self.cache.store(builds.clone(), now);

        let cache = Arc::clone(&self.cache);
        match tokio::task::spawn_blocking(move || cache.save()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "failed to persist remote build information"),
            Err(err) => warn!(%err, "remote build information writer aborted"),
        }
        Ok(builds)
    }

    /// At most one background refresh runs per fetcher.
    fn spawn_refresh(&self, now: SystemTime) {
        if self.refreshing.swap(true, Ordering::AcqRel) {
            debug!("remote build refresh already in flight");
            return;
        }
        let fetcher = self.clone();
        tokio::spawn(async move {
            if let Err(err) = fetcher.refresh(now).await {
                warn!(%err, "failed to refresh remote build information (keeping cache)");
            }
            fetcher.refreshing.store(false, Ordering::Release);
        });
    }

    async fn fetch_collections(&self) -> Result<Vec<BuildDescriptor>, RemoteError> {
        let (branches, tags) = tokio::join!(self.branches(), self.tags());
        let mut builds = branches?;
        builds.extend(tags?);
        Ok(builds)
    }

    async fn branches(&self) -> Result<Vec<BuildDescriptor>, RemoteError> {
        let items: Vec<BranchItem> = self.get_json(&self.source.branches_url()).await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let url = self.source.build_url(&item.commit.sha);
                BuildDescriptor::git(item.name, BuildKind::Branch, item.commit.sha, url)
            })
            .collect())
    }

    async fn tags(&self) -> Result<Vec<BuildDescriptor>, RemoteError> {
        let items: Vec<TagRefItem> = self.get_json(&self.source.tags_url()).await?;
        Ok(items
            .into_iter()
            .filter_map(|item| {
                let reference = item.reference.filter(|r| !r.is_empty())?;
                let name = reference
                    .strip_prefix("refs/tags/")
                    .unwrap_or(&reference)
                    .to_string();
                let url = self.source.build_url(&item.object.sha);
                Some(BuildDescriptor::git(name, BuildKind::Tag, item.object.sha, url))
            })
            .collect())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, RemoteError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|source| RemoteError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|source| RemoteError::Payload {
                url: url.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{matchers::*, responders::*, Expectation, Server};
    use serde_json::json;

    fn source_for(server: &Server) -> RemoteSource {
        RemoteSource {
            api_base: server.url_str(""),
            repo: "photonstorm/phaser".into(),
            cdn_base: "https://cdn.example".into(),
            lib: "phaser".into(),
        }
    }

    fn fetcher(server: &Server, cache: Arc<LookasideCache>) -> RemoteCatalogFetcher {
        RemoteCatalogFetcher::new(source_for(server), cache, Duration::from_secs(5))
            .expect("client")
    }

    fn expect_catalog(server: &Server) {
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/branches",
            ))
            .respond_with(json_encoded(json!([
                { "name": "master", "commit": { "sha": "m1" } },
                { "name": "dev", "commit": { "sha": "d1" } }
            ]))),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/git/refs/tags",
            ))
            .respond_with(json_encoded(json!([
                { "ref": "refs/tags/v2.4.0", "object": { "sha": "t240" } },
                { "object": { "sha": "noref" } }
            ]))),
        );
    }

    #[tokio::test]
    async fn normalizes_branches_and_tags() {
        let server = Server::run();
        expect_catalog(&server);
        let cache = Arc::new(LookasideCache::in_memory());
        let builds = fetcher(&server, cache.clone()).fetch_remote().await;

        let names: Vec<&str> = builds.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["master", "dev", "v2.4.0"]);
        assert_eq!(builds[0].kind, BuildKind::Branch);
        assert_eq!(builds[2].kind, BuildKind::Tag);
        assert_eq!(builds[2].sha.as_deref(), Some("t240"));
        assert_eq!(
            builds[2].url.as_deref(),
            Some("https://cdn.example/photonstorm/phaser/t240/build/phaser.js")
        );
        assert_eq!(cache.snapshot().map(|r| r.builds), Some(builds));
    }

    #[tokio::test]
    async fn fresh_cache_skips_network() {
        // No expectations: any request would fail the server's verification.
        let server = Server::run();
        let cache = Arc::new(LookasideCache::in_memory());
        let cached = vec![BuildDescriptor::git("master", BuildKind::Branch, "m0", "u")];
        cache.store(cached.clone(), SystemTime::now());

        let builds = fetcher(&server, cache).fetch_remote().await;
        assert_eq!(builds, cached);
    }

    #[tokio::test]
    async fn failed_refresh_returns_previous_list_unchanged() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/branches",
            ))
            .respond_with(status_code(500)),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/git/refs/tags",
            ))
            .respond_with(json_encoded(json!([]))),
        );

        let cache = Arc::new(LookasideCache::in_memory());
        let cached = vec![BuildDescriptor::git("v2.0.0", BuildKind::Tag, "old", "u")];
        let stale_time = SystemTime::now() - Duration::from_secs(10 * 60);
        cache.store(cached.clone(), stale_time);

        let fetcher = fetcher(&server, cache.clone());
        assert!(fetcher.refresh(SystemTime::now()).await.is_err());
        let record = cache.snapshot().expect("record kept");
        assert_eq!(record.builds, cached);
        assert!(!record.is_fresh(SystemTime::now()));

        // Still the old record, served without another query.
        let builds = fetcher.fetch_remote_at(stale_time).await;
        assert_eq!(builds, cached);
    }

    #[tokio::test]
    async fn malformed_payload_without_cache_is_empty() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/branches",
            ))
            .respond_with(status_code(200).body("{\"message\":\"rate limited\"}")),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/git/refs/tags",
            ))
            .respond_with(json_encoded(json!([]))),
        );

        let cache = Arc::new(LookasideCache::in_memory());
        let builds = fetcher(&server, cache.clone()).fetch_remote().await;
        assert!(builds.is_empty());
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn stale_cache_is_served_while_refreshing() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/branches",
            ))
            .respond_with(delay_and_then(
                Duration::from_secs(2),
                json_encoded(json!([{ "name": "master", "commit": { "sha": "m1" } }])),
            )),
        );
        server.expect(
            Expectation::matching(request::method_path(
                "GET",
                "/repos/photonstorm/phaser/git/refs/tags",
            ))
            .respond_with(json_encoded(json!([]))),
        );
        let cache = Arc::new(LookasideCache::in_memory());
        let stale = vec![BuildDescriptor::git("v1.0.0", BuildKind::Tag, "g", "u")];
        cache.store(stale.clone(), SystemTime::now() - Duration::from_secs(6 * 60));
        let fetcher = fetcher(&server, cache.clone());

        let started = std::time::Instant::now();
        assert_eq!(fetcher.fetch_remote().await, stale);
        assert_eq!(fetcher.fetch_remote().await, stale);
        assert!(started.elapsed() < Duration::from_secs(1));

        let refreshed = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                if let Some(record) = cache.snapshot().filter(|r| r.is_fresh(SystemTime::now())) {
                    return record.builds;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("background refresh finished");
        let names: Vec<&str> = refreshed.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["master"]);
    }
}
