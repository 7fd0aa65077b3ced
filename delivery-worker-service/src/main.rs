use std::sync::Arc;
use std::time::Duration;

use delivery_worker_service::{Config, DeliveryWorker, TelegramBotPublisher};
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
    let publisher = Arc::new(TelegramBotPublisher::new(config.bot_token.clone()));
    let worker = DeliveryWorker::new(db_pools.tx, db_pools.plain, publisher, config.batch_size, config.max_attempts);

    info!("delivery worker starting");
    let empty_pause = Duration::from_millis(config.empty_pause_ms);

    loop {
        match worker.process_batch().await {
            Ok(0) => tokio::time::sleep(empty_pause).await,
            Ok(n) => info!(processed = n, "processed delivery batch"),
            Err(e) => error!(error = %e, "delivery batch failed"),
        }
    }
}
