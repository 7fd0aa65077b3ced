use std::sync::Arc;
use std::time::Duration;

use engine_rpc::EngineRpcClient;
use engine_service::EngineService;
use ingress_service::{Config, Consumer, Reclaimer, StreamClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Runs `task` forever, restarting it after a pause if it ever returns an
/// error. A background daemon is not allowed to take the whole process down
/// because one dependency hiccuped — it logs critically and tries again.
async fn supervise<F, Fut>(name: &'static str, task: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    loop {
        if let Err(e) = task().await {
            error!(task = name, error = %e, "task exited with error, restarting after backoff");
        } else {
            error!(task = name, "task exited unexpectedly without error, restarting");
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = Config::from_env()?;
    let db_pools = db_pool::DbPools::connect(&config.database_url).await?;
    let redis_conn = redis_utils::connect(&config.redis_url).await?;

    let rpc = Arc::new(EngineRpcClient::new(None));
    let engine_service = EngineService::new(db_pools.tx.clone(), rpc.clone());

    let consumer_name = config.consumer_name();

    // Ensure the consumer group exists before any consumer/reclaimer task
    // starts racing to create it.
    StreamClient::new(
        redis_conn.clone(),
        config.stream_name.clone(),
        config.dlq_stream_name.clone(),
        config.consumer_group.clone(),
        consumer_name.clone(),
    )
    .ensure_group()
    .await?;

    let batch_size = config.batch_size as usize;
    let empty_pause = Duration::from_millis(200);
    let reclaim_pause = Duration::from_secs(config.pause_secs);
    let idle_ms = config.idle_ms;
    let max_retry = config.max_retry;

    info!(consumer = %consumer_name, "ingress service starting");

    let consumer_fut = supervise("consumer", || {
        let stream = StreamClient::new(
            redis_conn.clone(),
            config.stream_name.clone(),
            config.dlq_stream_name.clone(),
            config.consumer_group.clone(),
            consumer_name.clone(),
        );
        let engine_service = EngineService::new(db_pools.tx.clone(), rpc.clone());
        async move { Consumer::new(stream, engine_service, batch_size, empty_pause).run().await }
    });

    let reclaimer_fut = supervise("reclaimer", || {
        let stream = StreamClient::new(
            redis_conn.clone(),
            config.stream_name.clone(),
            config.dlq_stream_name.clone(),
            config.consumer_group.clone(),
            consumer_name.clone(),
        );
        let engine_service = EngineService::new(db_pools.tx.clone(), rpc.clone());
        async move {
            Reclaimer::new(stream, engine_service, idle_ms, batch_size, max_retry, reclaim_pause)
                .run()
                .await
        }
    });

    tokio::select! {
        _ = consumer_fut => {}
        _ = reclaimer_fut => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
