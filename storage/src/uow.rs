//! Unit-of-work helpers.
//!
//! The source used `asyncio.shield` around commit/rollback so that a
//! cancelled caller (e.g. a task cancelled during shutdown) could never
//! observe a transaction torn down mid-flight. Tokio has no direct
//! equivalent of shielding a future from the *caller* dropping it, but
//! `tokio::spawn` gives the same guarantee by a different route: once the
//! commit is spawned it runs to completion on the runtime regardless of
//! whether the awaiting caller's future is dropped, so a shutdown signal
//! racing a commit can never observe a half-finished transaction.

use anyhow::Context;
use sqlx::{PgPool, Postgres, Transaction};

/// Opens a new transactional session against the given pool.
pub async fn begin(pool: &PgPool) -> sqlx::Result<Transaction<'static, Postgres>> {
    pool.begin().await
}

/// Commits `tx`, shielded against cancellation of the awaiting task.
pub async fn commit_shielded(tx: Transaction<'static, Postgres>) -> anyhow::Result<()> {
    tokio::spawn(async move { tx.commit().await })
        .await
        .context("commit task panicked")?
        .context("commit failed")
}

/// Rolls `tx` back, shielded the same way as [`commit_shielded`]. Used on
/// every error path so a dropped connection never leaves a transaction idle
/// in the pool.
pub async fn rollback_shielded(tx: Transaction<'static, Postgres>) -> anyhow::Result<()> {
    tokio::spawn(async move { tx.rollback().await })
        .await
        .context("rollback task panicked")?
        .context("rollback failed")
}
