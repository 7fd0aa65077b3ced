//! Shared error taxonomy for the engine change-propagation pipeline.
//!
//! Mirrors the split the original service layer draws between domain errors
//! (the caller did something the aggregate rules forbid) and infrastructure
//! errors (the dependency underneath misbehaved). Domain errors carry enough
//! identity to log and react to; infrastructure errors are wrapped, not
//! paraphrased.

use uuid::Uuid;

/// An engine was referenced by id but no row exists for it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("engine {id} does not exist")]
pub struct EngineNotExistError {
    pub id: Uuid,
}

/// A restart (or other live operation) was attempted against an engine that
/// is currently marked dead.
#[derive(Debug, Clone, thiserror::Error)]
#[error("engine {id} is dead")]
pub struct EngineDeadError {
    pub id: Uuid,
}

/// The uuid returned by the remote engine did not match the uuid we asked to
/// restart. Surfaces a possible stale-address reuse.
#[derive(Debug, Clone, thiserror::Error)]
#[error("uuid mismatch: expected {expected}, received {received}")]
pub struct UuidMismatchError {
    pub expected: Uuid,
    pub received: Uuid,
}

/// Top-level error type returned by the domain/service layer.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error(transparent)]
    EngineNotExist(#[from] EngineNotExistError),

    #[error(transparent)]
    EngineDead(#[from] EngineDeadError),

    #[error(transparent)]
    UuidMismatch(#[from] UuidMismatchError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("rpc error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::EngineNotExist(_) => "ENGINE_NOT_EXIST",
            DomainError::EngineDead(_) => "ENGINE_DEAD",
            DomainError::UuidMismatch(_) => "UUID_MISMATCH",
            DomainError::Storage(_) => "STORAGE_ERROR",
            DomainError::Rpc(_) => "RPC_ERROR",
            DomainError::Transport(_) => "TRANSPORT_ERROR",
            DomainError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether retrying the same operation without intervention could
    /// plausibly succeed. Used by workers deciding whether to schedule a
    /// backoff retry or to dead-letter/park the item.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DomainError::Storage(_) | DomainError::Rpc(_) | DomainError::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_carry_stable_codes() {
        let id = Uuid::nil();
        assert_eq!(DomainError::from(EngineNotExistError { id }).code(), "ENGINE_NOT_EXIST");
        assert_eq!(DomainError::from(EngineDeadError { id }).code(), "ENGINE_DEAD");
    }

    #[test]
    fn only_infra_errors_are_retryable() {
        let id = Uuid::nil();
        assert!(!DomainError::from(EngineDeadError { id }).is_retryable());
        assert!(DomainError::from(sqlx::Error::PoolClosed).is_retryable());
    }
}
