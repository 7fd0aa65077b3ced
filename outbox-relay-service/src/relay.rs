//! Outbox relay: claims a batch of unfanned outbox rows, fans each one out
//! to the matching delivery tasks, and marks the outcome — all inside one
//! transaction per batch.
//!
//! Backoff on failure is quadratic in the attempt count
//! (`(attempts + 1)^2` seconds), deliberately distinct from the delivery
//! worker's own backoff curve: these two stages guard different failure
//! domains (subscription lookup + task insert vs. outbound publish) and
//! there's no reason to couple their retry pacing.

use chrono::Utc;
use sqlx::PgPool;
use storage::OutboxRepository;
use tracing::error;

use crate::fanout::spawn_engine_delivery_tasks;

const KNOWN_ENGINE_EVENT_TYPES: &[&str] = &["EngineDead", "EngineUpdated", "EngineRestored"];

pub struct OutboxRelay {
    tx_pool: PgPool,
    plain_pool: PgPool,
    batch_size: i64,
    max_attempts: i32,
}

impl OutboxRelay {
    pub fn new(tx_pool: PgPool, plain_pool: PgPool, batch_size: i64, max_attempts: i32) -> Self {
        Self {
            tx_pool,
            plain_pool,
            batch_size,
            max_attempts,
        }
    }

    /// Processes one batch. Returns the number of rows fanned out.
    pub async fn process_batch(&self) -> anyhow::Result<usize> {
        let mut tx = storage::uow::begin(&self.tx_pool).await?;

        let records = OutboxRepository::claim_batch(&mut tx, self.batch_size, self.max_attempts).await?;
        if records.is_empty() {
            storage::uow::rollback_shielded(tx).await?;
            return Ok(0);
        }

        let mut engine_records = Vec::new();
        let mut unhandled_types = Vec::new();
        for record in &records {
            if KNOWN_ENGINE_EVENT_TYPES.contains(&record.event_type.as_str()) {
                engine_records.push(record.clone());
            } else {
                unhandled_types.push(record.event_type.clone());
            }
        }

        if !engine_records.is_empty() {
            match spawn_engine_delivery_tasks(&self.plain_pool, &mut tx, &engine_records).await {
                Ok(()) => {
                    for record in &engine_records {
                        OutboxRepository::mark_fanned_out(&mut tx, record.id).await?;
                    }
                }
                Err(e) => {
                    error!(error = %e, count = engine_records.len(), "fan-out batch failed, scheduling retry");
                    for record in &engine_records {
                        let delay_secs = (record.attempts + 1).pow(2) as i64;
                        let next_attempt_at = Utc::now() + chrono::Duration::seconds(delay_secs);
                        OutboxRepository::mark_failed(&mut tx, record.id, next_attempt_at).await?;
                    }
                }
            }
        }

        let processed = engine_records.len();
        storage::uow::commit_shielded(tx).await?;

        if !unhandled_types.is_empty() {
            anyhow::bail!("no fan-out handler registered for event types: {unhandled_types:?}");
        }
        Ok(processed)
    }
}
