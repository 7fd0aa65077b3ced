//! Per-subscriber delivery task storage.
//!
//! One outbox row fans out into zero or more `BotDeliveryTask` rows, one per
//! matching subscription. The `(outbox_id, subscription_id)` unique
//! constraint makes `store` idempotent: re-running fan-out for an outbox row
//! that was already (partially) fanned out just skips the rows that exist.

use chrono::{DateTime, Utc};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::BotDeliveryTask;

pub struct CreateBotDeliveryTask {
    pub outbox_id: Uuid,
    pub subscription_id: Uuid,
}

pub struct TaskRepository;

impl TaskRepository {
    pub async fn store(
        tx: &mut Transaction<'_, Postgres>,
        tasks: &[CreateBotDeliveryTask],
    ) -> sqlx::Result<()> {
        for task in tasks {
            sqlx::query(
                r#"
                INSERT INTO bot_delivery_tasks (id, outbox_id, subscription_id, published, attempts, next_attempt_at)
                VALUES ($1, $2, $3, FALSE, 0, now())
                ON CONFLICT ON CONSTRAINT bot_delivery_task_unique DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(task.outbox_id)
            .bind(task.subscription_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn claim_batch(
        tx: &mut Transaction<'_, Postgres>,
        batch_size: i64,
        max_attempts: i32,
    ) -> sqlx::Result<Vec<BotDeliveryTask>> {
        sqlx::query_as::<_, BotDeliveryTask>(
            r#"
            SELECT id, outbox_id, subscription_id, published, attempts, next_attempt_at
            FROM bot_delivery_tasks
            WHERE published = FALSE
              AND attempts < $2
              AND next_attempt_at <= now()
            ORDER BY next_attempt_at
            FOR UPDATE SKIP LOCKED
            LIMIT $1
            "#,
        )
        .bind(batch_size)
        .bind(max_attempts)
        .fetch_all(&mut **tx)
        .await
    }

    pub async fn mark_published(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<()> {
        sqlx::query("UPDATE bot_delivery_tasks SET published = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            UPDATE bot_delivery_tasks
            SET attempts = attempts + 1, next_attempt_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(next_attempt_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Fetches the outbox event payloads referenced by a batch of tasks, so
    /// the delivery worker can render messages without a second round trip
    /// per task.
    pub async fn extract_events(
        tx: &mut Transaction<'_, Postgres>,
        outbox_ids: &[Uuid],
    ) -> sqlx::Result<Vec<crate::models::OutboxRecord>> {
        sqlx::query_as::<_, crate::models::OutboxRecord>(
            r#"
            SELECT id, aggregate_id, event_type, version, payload,
                   occurred_at, caused_by, fanned_out, attempts, next_attempt_at
            FROM outbox
            WHERE id = ANY($1)
            "#,
        )
        .bind(outbox_ids)
        .fetch_all(&mut **tx)
        .await
    }
}
