use std::time::Duration;

use outbox_relay_service::{Config, OutboxRelay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env()?;
    let db_pools = db_pool::DbPools::connect(&config.database_url).await?;
    let relay = OutboxRelay::new(db_pools.tx, db_pools.plain, config.batch_size, config.max_attempts);

    info!("outbox relay starting");
    let empty_pause = Duration::from_millis(config.empty_pause_ms);

    loop {
        match relay.process_batch().await {
            Ok(0) => tokio::time::sleep(empty_pause).await,
            Ok(n) => info!(fanned_out = n, "processed outbox batch"),
            Err(e) => error!(error = %e, "outbox batch failed"),
        }
    }
}
