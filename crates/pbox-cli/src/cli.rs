use std::{path::PathBuf, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::{eyre::WrapErr, Result};
use pbox_catalog::RemoteSource;
use pbox_core::PlaygroundConfig;
use pbox_store::resolve_cache_store_path;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Local example playground with a cached library build server",
    disable_help_subcommand = true
)]
pub struct PboxCli {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v", global = true)]
    pub trace: bool,
    #[command(flatten)]
    pub playground: PlaygroundArgs,
    #[command(subcommand)]
    pub command: Option<CommandGroupCli>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CommandGroupCli {
    #[command(about = "Run the playground HTTP server (the default).")]
    Serve,
    #[command(about = "Print the reconciled build catalog as JSON.")]
    Versions,
    #[command(about = "Download builds into the artifact cache and print their paths.")]
    Fetch {
        #[arg(value_name = "VERSION", required = true, num_args = 1..)]
        versions: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct PlaygroundArgs {
    #[arg(
        long,
        env = "EXAMPLE_PATH",
        default_value = "../phaser-examples",
        help = "Example corpus checkout (examples are read from its examples/ dir)",
        global = true
    )]
    pub example_path: PathBuf,
    #[arg(long, env = "PORT", default_value_t = 3000, global = true)]
    pub port: u16,
    #[arg(long, default_value = "0.0.0.0", global = true)]
    pub host: String,
    #[arg(
        long,
        env = "PBOX_PLAYGROUND_ROOT",
        default_value = "playground",
        help = "Viewer pages and their js/css/images/fonts",
        global = true
    )]
    pub playground_root: PathBuf,
    #[arg(
        long,
        env = "PBOX_CACHE_PATH",
        help = "Artifact cache directory [default: platform cache dir]/pbox",
        global = true
    )]
    pub cache_dir: Option<PathBuf>,
    #[arg(
        long,
        env = "PBOX_LOCAL_BUILDS",
        default_value = "local_builds",
        global = true
    )]
    pub local_builds: PathBuf,
    #[arg(
        long,
        env = "PBOX_BUILDS_CONFIG",
        default_value = "conf/phaser_builds.json",
        help = "Build override document ({\"builds\": [...]})",
        global = true
    )]
    pub builds_config: PathBuf,
    #[arg(long, default_value = "photonstorm/phaser", global = true)]
    pub repo: String,
    #[arg(long, default_value = "https://api.github.com", global = true)]
    pub api_base: String,
    #[arg(long, default_value = "https://cdn.rawgit.com", global = true)]
    pub cdn_base: String,
    #[arg(long, default_value = "phaser", global = true)]
    pub lib_name: String,
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 30,
        help = "Timeout for remote catalog queries",
        global = true
    )]
    pub catalog_timeout: u64,
    #[arg(
        long,
        value_name = "SECONDS",
        default_value_t = 60,
        help = "Timeout for build downloads",
        global = true
    )]
    pub download_timeout: u64,
}

impl PlaygroundArgs {
    pub fn into_config(self) -> Result<PlaygroundConfig> {
        let cache_dir = match self.cache_dir {
            Some(dir) => dir,
            None => {
                let location = resolve_cache_store_path()
                    .map_err(|err| color_eyre::eyre::eyre!("{err:#}"))?;
                tracing::debug!(
                    path = %location.path.display(),
                    source = location.source,
                    "using default cache directory"
                );
                location.path
            }
        };
        PlaygroundConfig {
            host: self.host,
            port: self.port,
            example_path: self.example_path,
            playground_root: self.playground_root,
            cache_dir,
            local_builds: self.local_builds,
            builds_config: self.builds_config,
            remote: RemoteSource {
                api_base: self.api_base,
                repo: self.repo,
                cdn_base: self.cdn_base,
                lib: self.lib_name,
            },
            catalog_timeout: Duration::from_secs(self.catalog_timeout),
            download_timeout: Duration::from_secs(self.download_timeout),
        }
        .absolutized()
        .map_err(|err| color_eyre::eyre::eyre!("{err:#}"))
        .wrap_err("invalid playground configuration")
    }
}
