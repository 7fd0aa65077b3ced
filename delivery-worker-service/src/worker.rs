//! Delivery worker: claims bot delivery tasks, publishes each to its
//! subscriber, and records the outcome.
//!
//! Publish results are paired back to tasks **by task id**, not by
//! position in the result vector. A batch almost always drops a few tasks
//! before publishing (missing event, missing telegram id), so the list of
//! things actually sent is shorter than the claimed batch; zipping the
//! publish results against the original claimed list by position would
//! silently misattribute every result after the first skip.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use sqlx::PgPool;
use storage::{BotDeliveryTask, OutboxRecord, SubscriptionRepository, TaskRepository};
use tracing::warn;
use uuid::Uuid;

use crate::publisher::BotPublisher;

pub struct DeliveryWorker {
    tx_pool: PgPool,
    plain_pool: PgPool,
    publisher: Arc<dyn BotPublisher>,
    batch_size: i64,
    max_attempts: i32,
}

impl DeliveryWorker {
    pub fn new(
        tx_pool: PgPool,
        plain_pool: PgPool,
        publisher: Arc<dyn BotPublisher>,
        batch_size: i64,
        max_attempts: i32,
    ) -> Self {
        Self {
            tx_pool,
            plain_pool,
            publisher,
            batch_size,
            max_attempts,
        }
    }

    /// Processes one batch. Returns the number of tasks claimed (published
    /// or not — a skip still counts as processed, since it won't be
    /// retried without new data arriving).
    pub async fn process_batch(&self) -> anyhow::Result<usize> {
        let mut tx = storage::uow::begin(&self.tx_pool).await?;

        let tasks = TaskRepository::claim_batch(&mut tx, self.batch_size, self.max_attempts).await?;
        if tasks.is_empty() {
            storage::uow::rollback_shielded(tx).await?;
            return Ok(0);
        }

        let outbox_ids: Vec<Uuid> = tasks.iter().map(|t| t.outbox_id).collect();
        let events = TaskRepository::extract_events(&mut tx, &outbox_ids).await?;
        let events_by_id: HashMap<Uuid, OutboxRecord> = events.into_iter().map(|e| (e.id, e)).collect();

        let subscription_ids: Vec<Uuid> = tasks.iter().map(|t| t.subscription_id).collect();
        let telegram_ids =
            SubscriptionRepository::get_telegram_ids_for_subscriptions(&self.plain_pool, &subscription_ids).await?;

        let mut skipped: HashSet<Uuid> = HashSet::new();
        let mut sendable: Vec<(Uuid, i64, OutboxRecord)> = Vec::new();

        for task in &tasks {
            let Some(event) = events_by_id.get(&task.outbox_id) else {
                warn!(task_id = %task.id, "skipping task: outbox event not found");
                skipped.insert(task.id);
                continue;
            };
            let Some(telegram_id) = telegram_ids.get(&task.subscription_id) else {
                warn!(task_id = %task.id, "skipping task: no telegram id for subscription");
                skipped.insert(task.id);
                continue;
            };
            sendable.push((task.id, *telegram_id, event.clone()));
        }

        let publish_results: HashMap<Uuid, bool> = join_all(sendable.iter().map(|(task_id, telegram_id, event)| {
            let publisher = self.publisher.clone();
            let task_id = *task_id;
            let telegram_id = *telegram_id;
            let event_type = event.event_type.clone();
            let payload = event.payload.clone();
            async move {
                let ok = publisher.publish(telegram_id, &event_type, &payload).await;
                (task_id, ok)
            }
        }))
        .await
        .into_iter()
        .collect();

        for task in &tasks {
            if skipped.contains(&task.id) {
                continue;
            }
            match publish_results.get(&task.id) {
                Some(true) => TaskRepository::mark_published(&mut tx, task.id).await?,
                Some(false) | None => {
                    self.mark_failed(&mut tx, task).await?;
                }
            }
        }

        let processed = tasks.len();
        storage::uow::commit_shielded(tx).await?;
        Ok(processed)
    }

    async fn mark_failed(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        task: &BotDeliveryTask,
    ) -> anyhow::Result<()> {
        let delay_secs = (task.attempts.max(0) as i64).pow(2);
        let next_attempt_at = Utc::now() + chrono::Duration::seconds(delay_secs);
        TaskRepository::mark_failed(tx, task.id, next_attempt_at).await?;
        Ok(())
    }
}
