//! Minimal Redis connection helper shared by the ingress consumer and the
//! reclaimer loop.
//!
//! The upstream writes engine state with `HSET` and relies on keyspace
//! notifications landing on a consumer-group stream; all we need on this
//! side is one cheaply-cloneable connection manager guarded against
//! concurrent command interleaving.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::info;

/// Shared Redis connection manager guarded by a Tokio mutex so that the
/// stream reader and the pending-entry reclaimer can safely share one
/// connection without issuing overlapping commands.
pub type SharedConnectionManager = Arc<Mutex<ConnectionManager>>;

/// Connects to Redis and wraps the resulting connection manager for shared
/// use across tasks.
pub async fn connect(redis_url: &str) -> Result<SharedConnectionManager> {
    let client = Client::open(redis_url).context("invalid redis url")?;
    let manager = client
        .get_connection_manager()
        .await
        .context("failed to establish redis connection manager")?;
    info!("connected to redis");
    Ok(Arc::new(Mutex::new(manager)))
}

/// Runs `fut` but gives up after `duration`, turning a hang into a timeout
/// error instead of blocking a worker loop forever.
pub async fn with_timeout<T>(
    duration: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(duration, fut).await {
        Ok(inner) => inner,
        Err(_) => anyhow::bail!("redis operation timed out after {duration:?}"),
    }
}
