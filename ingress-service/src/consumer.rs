//! Primary read loop: consumes newly delivered stream entries for this
//! consumer and dispatches each to the handler. Entries that fail to
//! handle are left pending — they get picked up later either by this same
//! consumer (retrying an XREADGROUP won't redeliver them; only the
//! reclaimer revisits pending entries) or, if this consumer dies, by
//! another consumer's reclaimer pass.

use std::time::Duration;

use engine_service::EngineService;
use tracing::{debug, error, info};

use crate::handler::handle_entry;
use crate::stream::StreamClient;

pub struct Consumer {
    stream: StreamClient,
    engine_service: EngineService,
    batch_size: usize,
    empty_pause: Duration,
}

impl Consumer {
    pub fn new(stream: StreamClient, engine_service: EngineService, batch_size: usize, empty_pause: Duration) -> Self {
        Self {
            stream,
            engine_service,
            batch_size,
            empty_pause,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        self.stream.ensure_group().await?;
        info!(consumer = %self.stream.consumer, "ingress consumer started");

        loop {
            let entries = self.stream.read_new(self.batch_size).await?;
            if entries.is_empty() {
                tokio::time::sleep(self.empty_pause).await;
                continue;
            }

            let mut to_ack = Vec::with_capacity(entries.len());
            for entry in &entries {
                match handle_entry(&entry.id, &entry.fields, &self.stream.stream, &self.engine_service).await {
                    Ok(_handled) => to_ack.push(entry.id.clone()),
                    Err(e) => {
                        error!(id = %entry.id, error = %e, "failed to handle entry, leaving pending");
                    }
                }
            }
            debug!(acked = to_ack.len(), total = entries.len(), "processed batch");
            self.stream.ack(&to_ack).await?;
        }
    }
}
