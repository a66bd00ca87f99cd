use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use stow_logger::Logger;
use stow_server::{Server, ServerConfig, load_config};

/// Serves signed blob URLs from a local bucket.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file (TOML, JSON or YAML); `STOW__*` variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on, overriding the settings.
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg: ServerConfig =
        load_config(cli.config.as_deref()).context("Critical: Configuration is malformed")?;
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    let _log = Logger::from_settings(env!("CARGO_PKG_NAME"), &cfg.log)?;

    Server::builder().config(cfg).build().await?.run().await
}
