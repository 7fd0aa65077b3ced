//! Pending-entry reclaimer: periodically claims entries that have sat idle
//! past `idle_ms` (almost always because the consumer that first read them
//! died before acking), re-dispatches them, and routes anything that has
//! already exceeded the retry budget straight to the dead-letter stream
//! without invoking the handler again.

use std::time::Duration;

use domain::Version;
use engine_service::EngineService;
use resilience::{with_retry, RetryConfig};
use tracing::{error, info, warn};

use crate::handler::handle_entry;
use crate::stream::{RawEntry, StreamClient};

pub struct Reclaimer {
    stream: StreamClient,
    engine_service: EngineService,
    idle_ms: i64,
    batch_size: usize,
    max_retry: i64,
    pause: Duration,
    retry: RetryConfig,
}

impl Reclaimer {
    pub fn new(
        stream: StreamClient,
        engine_service: EngineService,
        idle_ms: i64,
        batch_size: usize,
        max_retry: i64,
        pause: Duration,
    ) -> Self {
        Self {
            stream,
            engine_service,
            idle_ms,
            batch_size,
            max_retry,
            pause,
            retry: RetryConfig::default(),
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        info!("reclaimer started");
        let mut cursor = "0-0".to_string();

        loop {
            let (next_cursor, mut entries) = with_retry(&self.retry, || {
                let cursor = cursor.clone();
                async move { self.stream.autoclaim(self.idle_ms, &cursor, self.batch_size).await }
            })
            .await
            .map_err(|e| anyhow::anyhow!(e.into_inner()))?;
            cursor = next_cursor;

            if entries.is_empty() {
                tokio::time::sleep(self.pause).await;
                continue;
            }

            entries.sort_by_key(|e| Version::from_stream_id(&e.id).ok());

            let ids: Vec<String> = entries.iter().map(|e| e.id.clone()).collect();
            let deliveries = with_retry(&self.retry, || {
                let ids = ids.clone();
                async move { self.stream.delivery_counts(&ids).await }
            })
            .await
            .map_err(|e| anyhow::anyhow!(e.into_inner()))?;

            let mut to_ack = Vec::new();
            for entry in &entries {
                let delivery_count = deliveries.get(&entry.id).copied().unwrap_or(1);
                if delivery_count > self.max_retry {
                    if let Err(e) = self.deadletter(entry).await {
                        error!(id = %entry.id, error = %e, "failed to dead-letter entry, leaving pending");
                        continue;
                    }
                    to_ack.push(entry.id.clone());
                    continue;
                }

                match handle_entry(&entry.id, &entry.fields, &self.stream.stream, &self.engine_service).await {
                    Ok(_) => to_ack.push(entry.id.clone()),
                    Err(e) => {
                        warn!(id = %entry.id, error = %e, "reclaim handling failed, leaving pending");
                    }
                }
            }

            with_retry(&self.retry, || {
                let to_ack = to_ack.clone();
                async move { self.stream.ack(&to_ack).await }
            })
            .await
            .map_err(|e| anyhow::anyhow!(e.into_inner()))?;
        }
    }

    async fn deadletter(&self, entry: &RawEntry) -> anyhow::Result<()> {
        with_retry(&self.retry, || async { self.stream.send_to_dlq(&entry.id, &entry.fields).await })
            .await
            .map_err(|e| anyhow::anyhow!(e.into_inner()))?;
        Ok(())
    }
}
