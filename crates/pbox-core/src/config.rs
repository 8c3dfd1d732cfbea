use std::{path::PathBuf, time::Duration};

use anyhow::Context;
use pbox_catalog::{RemoteSource, DEFAULT_CATALOG_TIMEOUT, LOOKASIDE_FILE};
use pbox_store::{absolutize, DEFAULT_DOWNLOAD_TIMEOUT};

/// Where the playground finds its inputs and keeps its caches.
#[derive(Debug, Clone)]
pub struct PlaygroundConfig {
    pub host: String,
    pub port: u16,
    /// Corpus checkout; examples live in its `examples` directory.
    pub example_path: PathBuf,
    pub playground_root: PathBuf,
    pub cache_dir: PathBuf,
    pub local_builds: PathBuf,
    pub builds_config: PathBuf,
    pub remote: RemoteSource,
    pub catalog_timeout: Duration,
    pub download_timeout: Duration,
}

impl Default for PlaygroundConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            example_path: PathBuf::from("../phaser-examples"),
            playground_root: PathBuf::from("playground"),
            cache_dir: PathBuf::from("cache"),
            local_builds: PathBuf::from("local_builds"),
            builds_config: PathBuf::from("conf/phaser_builds.json"),
            remote: RemoteSource::default(),
            catalog_timeout: DEFAULT_CATALOG_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

impl PlaygroundConfig {
    #[must_use]
    pub fn example_root(&self) -> PathBuf {
        self.example_path.join("examples")
    }

    /// Downloaded builds. Nothing else is written here.
    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        self.cache_dir.join("builds")
    }

    #[must_use]
    pub fn lookaside_path(&self) -> PathBuf {
        self.cache_dir.join("catalog").join(LOOKASIDE_FILE)
    }

    #[must_use]
    pub fn lib(&self) -> &str {
        &self.remote.lib
    }

    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Anchor every relative path at the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn absolutized(mut self) -> anyhow::Result<Self> {
        for path in [
            &mut self.example_path,
            &mut self.playground_root,
            &mut self.cache_dir,
            &mut self.local_builds,
            &mut self.builds_config,
        ] {
            *path = absolutize(std::mem::take(path)).context("resolving playground paths")?;
        }
        Ok(self)
    }
}
