//! Turns a batch of claimed outbox rows into per-subscriber delivery tasks.
//!
//! A row with no matching subscriptions is not an error — it's simply an
//! event nobody asked to hear about — so it still counts as "fanned out",
//! just with zero tasks produced.

use sqlx::{PgPool, Postgres, Transaction};
use storage::{CreateBotDeliveryTask, OutboxRecord, SubscriptionRepository, TaskRepository};
use tracing::warn;

pub async fn spawn_engine_delivery_tasks(
    plain_pool: &PgPool,
    tx: &mut Transaction<'_, Postgres>,
    records: &[OutboxRecord],
) -> anyhow::Result<()> {
    let pairs: Vec<(uuid::Uuid, &str)> = records
        .iter()
        .map(|r| (r.aggregate_id, r.event_type.as_str()))
        .collect();
    let mapping = SubscriptionRepository::get_engine_subscriptions_for_events(plain_pool, &pairs).await?;

    let mut tasks = Vec::new();
    for record in records {
        let key = (record.aggregate_id, record.event_type.clone());
        let subscriber_ids = mapping.get(&key).cloned().unwrap_or_default();
        if subscriber_ids.is_empty() {
            warn!(outbox_id = %record.id, event_type = %record.event_type, "no subscriptions matched, zero tasks fanned out");
            continue;
        }
        for subscription_id in subscriber_ids {
            tasks.push(CreateBotDeliveryTask {
                outbox_id: record.id,
                subscription_id,
            });
        }
    }

    if !tasks.is_empty() {
        TaskRepository::store(tx, &tasks).await?;
    }
    Ok(())
}
