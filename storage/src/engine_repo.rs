//! Engine aggregate persistence.
//!
//! `save` is the one statement the whole version-guard design rests on: a
//! single `INSERT ... ON CONFLICT DO UPDATE` whose `WHERE` clause re-checks
//! the version ordering at the database level, so that two concurrent
//! reconcilers racing on the same engine can't both believe they won.

use domain::{Engine, EngineStatus, Version};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

pub struct EngineRepository;

fn status_str(status: EngineStatus) -> &'static str {
    match status {
        EngineStatus::Active => "active",
        EngineStatus::Ready => "ready",
        EngineStatus::Dead => "dead",
    }
}

fn status_from_str(s: &str) -> EngineStatus {
    match s {
        "active" => EngineStatus::Active,
        "dead" => EngineStatus::Dead,
        _ => EngineStatus::Ready,
    }
}

impl EngineRepository {
    /// Locks the engine row for the duration of the caller's transaction.
    /// Returns `None` if the engine has never been seen.
    pub async fn get_for_update(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> sqlx::Result<Option<Engine>> {
        let row = sqlx::query(
            r#"
            SELECT id, created, status, uuid, addr, version_ts, version_seq
            FROM engines
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|row| {
            use sqlx::Row;
            let status: String = row.get("status");
            Engine::from_row_parts(
                row.get("id"),
                row.get("created"),
                status_from_str(&status),
                row.get("uuid"),
                row.get("addr"),
                Version::new(
                    row.get::<i64, _>("version_ts") as u64,
                    row.get::<i32, _>("version_seq") as u32,
                ),
            )
        }))
    }

    /// Read-only lookup, no row lock. Used by the restart use case, which
    /// never mutates the engine.
    pub async fn get(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> sqlx::Result<Option<Engine>> {
        let row = sqlx::query(
            r#"
            SELECT id, created, status, uuid, addr, version_ts, version_seq
            FROM engines
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|row| {
            use sqlx::Row;
            let status: String = row.get("status");
            Engine::from_row_parts(
                row.get("id"),
                row.get("created"),
                status_from_str(&status),
                row.get("uuid"),
                row.get("addr"),
                Version::new(
                    row.get::<i64, _>("version_ts") as u64,
                    row.get::<i32, _>("version_seq") as u32,
                ),
            )
        }))
    }

    /// Upserts the engine, guarded by the stored version: the write only
    /// takes effect if `engine.version` strictly supersedes whatever
    /// version is currently on disk (or the row doesn't exist yet).
    /// Returns whether the write took effect.
    pub async fn save(tx: &mut Transaction<'_, Postgres>, engine: &Engine) -> sqlx::Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO engines (id, created, status, uuid, addr, version_ts, version_seq)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                uuid = EXCLUDED.uuid,
                addr = EXCLUDED.addr,
                version_ts = EXCLUDED.version_ts,
                version_seq = EXCLUDED.version_seq
            WHERE (engines.version_ts, engines.version_seq) < (EXCLUDED.version_ts, EXCLUDED.version_seq)
            RETURNING id
            "#,
        )
        .bind(engine.id)
        .bind(engine.created)
        .bind(status_str(engine.status))
        .bind(engine.uuid)
        .bind(&engine.addr)
        .bind(engine.version.ts as i64)
        .bind(engine.version.seq as i32)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(result.is_some())
    }

    /// Bulk-deletes every engine currently marked dead. Administrative
    /// cleanup, not part of the reconciliation path; callers don't get the
    /// deleted rows back, only the count.
    pub async fn remove_dead(tx: &mut Transaction<'_, Postgres>) -> sqlx::Result<u64> {
        let result = sqlx::query("DELETE FROM engines WHERE status = 'dead'")
            .execute(&mut **tx)
            .await?;
        Ok(result.rows_affected())
    }
}
