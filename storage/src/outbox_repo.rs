//! Transactional outbox storage.
//!
//! `store` is always called from inside the same transaction that wrote the
//! engine aggregate's new state, so a crash between the two can never
//! happen: either both land or neither does. The outbox id is derived from
//! `(caused_by, event.id)` so that re-processing the same ingress message
//! twice (at-least-once delivery) produces the same row and `ON CONFLICT DO
//! NOTHING` absorbs the duplicate.

use chrono::{DateTime, Utc};
use domain::DomainEvent;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::models::OutboxRecord;

/// Namespace for outbox row ids, distinct from the event-id namespace so the
/// two derivations can never collide even with identical input strings.
const OUTBOX_NAMESPACE: Uuid = Uuid::from_u128(0x6f78_7261_795f_6f75_7462_6f78_5f5f_6e73);

pub struct OutboxRepository;

impl OutboxRepository {
    /// Appends every event to the outbox. `caused_by` identifies the ingress
    /// message that produced these events and must stay the same for every
    /// event in the batch — it is the correlation id a reader follows back
    /// to "what stream delivery triggered this".
    pub async fn store(
        tx: &mut Transaction<'_, Postgres>,
        events: &[DomainEvent],
        caused_by: &str,
    ) -> sqlx::Result<()> {
        for event in events {
            let outbox_id = Uuid::new_v5(&OUTBOX_NAMESPACE, format!("{caused_by}:{}", event.id).as_bytes());

            sqlx::query(
                r#"
                INSERT INTO outbox (
                    id, aggregate_id, event_type, version, payload,
                    occurred_at, caused_by, fanned_out, attempts, next_attempt_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, 0, now())
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(outbox_id)
            .bind(event.aggregate_id)
            .bind(event.event_type())
            .bind(event.version.to_stream_id())
            .bind(event.payload())
            .bind(event.occurred_at)
            .bind(caused_by)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Claims up to `batch_size` unfanned rows that are due for an attempt,
    /// locking them for the lifetime of the caller's transaction so a
    /// second relay instance racing the same table skips past them instead
    /// of blocking.
    pub async fn claim_batch(
        tx: &mut Transaction<'_, Postgres>,
        batch_size: i64,
        max_attempts: i32,
    ) -> sqlx::Result<Vec<OutboxRecord>> {
        sqlx::query_as::<_, OutboxRecord>(
            r#"
            SELECT id, aggregate_id, event_type, version, payload,
                   occurred_at, caused_by, fanned_out, attempts, next_attempt_at
            FROM outbox
            WHERE fanned_out = FALSE
              AND attempts < $2
              AND next_attempt_at <= now()
            ORDER BY occurred_at
            FOR UPDATE SKIP LOCKED
            LIMIT $1
            "#,
        )
        .bind(batch_size)
        .bind(max_attempts)
        .fetch_all(&mut **tx)
        .await
    }

    pub async fn mark_fanned_out(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<()> {
        sqlx::query("UPDATE outbox SET fanned_out = TRUE WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Bumps the attempt counter and schedules the next try. The relay uses
    /// a quadratic backoff, distinct from the delivery worker's own backoff
    /// formula — they guard different failure domains and there's no reason
    /// for them to share a curve.
    pub async fn mark_failed(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        next_attempt_at: DateTime<Utc>,
    ) -> sqlx::Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox
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
}
