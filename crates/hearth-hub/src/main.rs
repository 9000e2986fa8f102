//! hearthd - the hearth hub daemon.
//!
//! Samples the host, connects to configured sensor gateways, and persists
//! everything into one SQLite time-series database.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hearth_hub::{Hub, HubConfig};

#[derive(Parser)]
#[command(name = "hearthd")]
#[command(about = "Hearth hub daemon")]
#[command(version)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, default_value = "hearth.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = HubConfig::load(&cli.config)?;
    info!(
        db = %config.db_path.display(),
        gateways = config.gateways.len(),
        "starting hearthd"
    );

    let hub = Hub::new(config)?;
    let handles = hub.start();

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    hub.stop();
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
