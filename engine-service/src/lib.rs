//! Use cases built on top of the `Engine` aggregate: reconciling reported
//! state into storage and requesting a restart. Each write use case opens
//! exactly one transaction, mutates the aggregate in memory, saves it with
//! the version guard, and — only if the save actually took effect — appends
//! whatever events it raised to the outbox in the same transaction.

use std::sync::Arc;

use domain::{Engine, Version};
use engine_rpc::EngineRpcClient;
use error_types::{DomainError, EngineDeadError, EngineNotExistError};
use sqlx::PgPool;
use uuid::Uuid;

pub struct EngineService {
    tx_pool: PgPool,
    rpc: Arc<EngineRpcClient>,
}

impl EngineService {
    pub fn new(tx_pool: PgPool, rpc: Arc<EngineRpcClient>) -> Self {
        Self { tx_pool, rpc }
    }

    /// Reconciles a reported `hset` state change. `caused_by` identifies the
    /// ingress message driving this call and is passed straight through to
    /// the outbox so every event raised in response carries the same
    /// correlation id.
    pub async fn upsert(
        &self,
        id: Uuid,
        running: bool,
        uuid: Option<Uuid>,
        addr: String,
        version: Version,
        caused_by: &str,
    ) -> Result<(), DomainError> {
        let mut tx = storage::uow::begin(&self.tx_pool).await?;

        let mut engine = match storage::EngineRepository::get_for_update(&mut tx, id).await? {
            None => Engine::new_ready(id, uuid, addr, version),
            Some(mut existing) if existing.is_dead() => {
                existing.restore(running, uuid, version);
                existing
            }
            Some(mut existing) => {
                existing.update(running, uuid, version);
                existing
            }
        };

        let applied = storage::EngineRepository::save(&mut tx, &engine).await?;
        if applied {
            let events = engine.pull_events();
            if !events.is_empty() {
                storage::OutboxRepository::store(&mut tx, &events, caused_by).await?;
            }
        }

        storage::uow::commit_shielded(tx)
            .await
            .map_err(DomainError::Internal)?;
        Ok(())
    }

    /// Reconciles an `expired` keyspace notification. The aggregate must
    /// already exist; callers that want an absent engine treated as a
    /// harmless no-op (ingress acking a notification it can't act on) catch
    /// `DomainError::EngineNotExist` themselves rather than have it
    /// swallowed here.
    pub async fn mark_dead(&self, id: Uuid, version: Version, caused_by: &str) -> Result<(), DomainError> {
        let mut tx = storage::uow::begin(&self.tx_pool).await?;

        let Some(mut engine) = storage::EngineRepository::get_for_update(&mut tx, id).await? else {
            storage::uow::rollback_shielded(tx).await.map_err(DomainError::Internal)?;
            return Err(EngineNotExistError { id }.into());
        };

        engine.mark_dead(version);
        let applied = storage::EngineRepository::save(&mut tx, &engine).await?;
        if applied {
            let events = engine.pull_events();
            if !events.is_empty() {
                storage::OutboxRepository::store(&mut tx, &events, caused_by).await?;
            }
        }

        storage::uow::commit_shielded(tx)
            .await
            .map_err(DomainError::Internal)?;
        Ok(())
    }

    /// Requests a restart of the engine's process. Read-only: no aggregate
    /// state changes as a result of a restart request, only the remote
    /// process does.
    pub async fn restart(&self, id: Uuid, uuid: Uuid) -> Result<(), DomainError> {
        let mut tx = storage::uow::begin(&self.tx_pool).await?;
        let engine = storage::EngineRepository::get(&mut tx, id).await?;
        storage::uow::rollback_shielded(tx).await.map_err(DomainError::Internal)?;

        let engine = engine.ok_or(EngineNotExistError { id })?;
        if engine.is_dead() {
            return Err(EngineDeadError { id }.into());
        }

        self.rpc.restart(&engine.addr, uuid).await
    }

    /// Deletes every dead engine row. An admin/control-surface action, not
    /// part of any reconciliation flow — no events are raised, since a
    /// deleted row has no subscribers left to notify.
    pub async fn remove_dead(&self) -> Result<u64, DomainError> {
        let mut tx = storage::uow::begin(&self.tx_pool).await?;
        let count = storage::EngineRepository::remove_dead(&mut tx).await?;
        storage::uow::commit_shielded(tx)
            .await
            .map_err(DomainError::Internal)?;
        Ok(count)
    }
}
