use tracing::info;
use tracing_subscriber::EnvFilter;

use parley_shared::constants::APP_NAME;
use parley_store::Database;
use parley_tracker::{ChannelDirectory, TrackerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_tracker=debug")),
        )
        .init();

    info!("Starting {APP_NAME} tracker v{}", env!("CARGO_PKG_VERSION"));

    let config = TrackerConfig::from_env();
    info!(?config, "Loaded configuration");

    let db = Database::open_at(&config.db_path)?;
    let channels = ChannelDirectory::open(db)?;
    let tracker = parley_tracker::start(&config, channels).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down");
    tracker.shutdown();

    Ok(())
}
