//! Civ Dedicated Server
//!
//! # Usage
//!
//! ```bash
//! # Default roster, 1200 ticks paced at the match tick rate
//! cargo run -p civ_server
//!
//! # Load a RON config and run as fast as possible
//! cargo run -p civ_server -- --config server.ron --unpaced
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `info`).

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use civ_core::components::Tick;
use civ_core::selection::MemorySelectionStore;
use civ_server::host::MatchHost;
use civ_server::store::JsonFileSelectionStore;
use civ_server::{build_match, ServerConfig};

#[derive(Parser)]
#[command(name = "civ_server")]
#[command(about = "Headless authority host for civilization matches")]
#[command(version)]
struct Cli {
    /// RON server config. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the config's tick budget
    #[arg(short, long)]
    ticks: Option<Tick>,

    /// Run ticks back to back instead of at the match tick rate
    #[arg(long)]
    unpaced: bool,
}

#[tokio::main]
async fn main() -> Result<(), civ_server::ServerError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading server config");
            ServerConfig::load(path)?
        }
        None => ServerConfig::default(),
    };
    if let Some(ticks) = cli.ticks {
        config.tick_budget = ticks;
    }
    if cli.unpaced {
        config.realtime = false;
    }

    tracing::info!(
        participants = config.roster.len(),
        tick_rate = config.game.tick_rate,
        "Starting civ dedicated server"
    );

    let game = match &config.selection_store {
        Some(path) => build_match(&config, &mut JsonFileSelectionStore::open(path)?)?,
        None => build_match(&config, &mut MemorySelectionStore::new())?,
    };

    let mut host = MatchHost::new(game);
    let reached = host.run(config.tick_budget, config.realtime).await?;

    tracing::info!(
        tick = reached,
        units = host.game().unit_count(),
        state_hash = host.game().state_hash(),
        "Match finished"
    );
    Ok(())
}
