use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use pbox_core::{Playground, PlaygroundConfig, ResolvedBuild};
use serde_json::json;

mod cli;

use cli::{CommandGroupCli, PboxCli};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = PboxCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let config = cli.playground.into_config()?;
    match cli.command.unwrap_or(CommandGroupCli::Serve) {
        CommandGroupCli::Serve => serve(config).await,
        CommandGroupCli::Versions => versions(config).await,
        CommandGroupCli::Fetch { versions } => fetch(config, &versions).await,
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = format!(
        "pbox={level},pbox_cli={level},pbox_core={level},pbox_catalog={level},pbox_store={level}"
    );
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn serve(config: PlaygroundConfig) -> Result<()> {
    let playground = Playground::from_config(config)?;
    pbox_core::run(playground).await?;
    Ok(())
}

async fn versions(config: PlaygroundConfig) -> Result<()> {
    let playground = Playground::from_config(config)?;
    let versions = playground.resolver().versions().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "versions": versions }))?
    );
    Ok(())
}

async fn fetch(config: PlaygroundConfig, versions: &[String]) -> Result<()> {
    let playground = Playground::from_config(config)?;
    for version in versions {
        let build = playground.resolver().resolve(version).await?;
        if let ResolvedBuild::Local { path } = &build {
            if !path.is_file() {
                return Err(eyre!(
                    "local build {version} not found at {}",
                    path.display()
                ));
            }
        }
        println!("{version}\t{}", build.path().display());
    }
    Ok(())
}
