//! The `Engine` aggregate: the write-side model of a single fleet member,
//! reconciled from Redis keyspace notifications and guarded by
//! [`Version`](crate::version::Version) so that out-of-order or duplicate
//! deliveries can never move it backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event::{DomainEvent, EngineEventKind};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Reporting state and actively serving traffic.
    Active,
    /// Known to exist but not currently running.
    Ready,
    /// Its Redis key expired; presumed gone until it reports again.
    Dead,
}

/// A snapshot of the fields that participate in change detection. Two
/// updates that land the aggregate in the same observable state raise no
/// event even though the stored version still advances — see
/// [`Engine::update`]. `addr` is immutable after insert, so it plays no
/// part in this comparison.
#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    status: EngineStatus,
    uuid: Option<Uuid>,
}

/// A fleet engine. Mutating methods are all version-guarded: a version that
/// does not strictly [`Version::supersedes`] the stored one leaves the
/// aggregate untouched and returns `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engine {
    pub id: Uuid,
    pub created: DateTime<Utc>,
    pub status: EngineStatus,
    pub uuid: Option<Uuid>,
    pub addr: String,
    pub version: Version,

    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Engine {
    /// Constructs a brand-new engine row. Per the reconciliation rules, a
    /// first sighting always lands in `Ready`, even if the reported
    /// `running` flag is already true — the engine only becomes `Active`
    /// on a subsequent update.
    pub fn new_ready(id: Uuid, uuid: Option<Uuid>, addr: String, version: Version) -> Self {
        Self {
            id,
            created: Utc::now(),
            status: EngineStatus::Ready,
            uuid,
            addr,
            version,
            events: Vec::new(),
        }
    }

    /// Reconstructs an engine from stored fields, e.g. a database row. Does
    /// not reset or replay events — the caller is loading existing state,
    /// not creating a new aggregate.
    pub fn from_row_parts(
        id: Uuid,
        created: DateTime<Utc>,
        status: EngineStatus,
        uuid: Option<Uuid>,
        addr: String,
        version: Version,
    ) -> Self {
        Self {
            id,
            created,
            status,
            uuid,
            addr,
            version,
            events: Vec::new(),
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            status: self.status,
            uuid: self.uuid,
        }
    }

    /// Applies a reported state change. Returns whether the version was
    /// accepted (i.e. it superseded the stored one); a rejected version
    /// means stale/duplicate delivery and is always a silent no-op, never an
    /// error. `addr` is fixed at creation and cannot be changed by an
    /// update.
    pub fn update(&mut self, running: bool, uuid: Option<Uuid>, version: Version) -> bool {
        if !version.supersedes(self.version) {
            return false;
        }
        let before = self.snapshot();

        self.status = if running { EngineStatus::Active } else { EngineStatus::Ready };
        self.uuid = uuid;
        self.version = version;

        if self.snapshot() != before {
            self.events.push(DomainEvent::new(
                self.id,
                self.version,
                EngineEventKind::EngineUpdated {
                    new_uuid: self.uuid,
                    new_status: self.status,
                },
            ));
        }
        true
    }

    /// Marks the engine dead in response to its Redis key expiring. Unlike
    /// `update`, this always emits once the version check passes — a second
    /// expiry arriving for an already-dead engine still advances the
    /// version and still raises `EngineDead`.
    pub fn mark_dead(&mut self, version: Version) -> bool {
        if !version.supersedes(self.version) {
            return false;
        }

        self.status = EngineStatus::Dead;
        self.version = version;

        self.events
            .push(DomainEvent::new(self.id, self.version, EngineEventKind::EngineDead));
        true
    }

    /// Brings a dead engine back after it reports state again. `addr` is
    /// unaffected; the engine's address never changes post-insert.
    pub fn restore(&mut self, running: bool, uuid: Option<Uuid>, version: Version) -> bool {
        if !version.supersedes(self.version) {
            return false;
        }
        let before = self.snapshot();

        self.status = if running { EngineStatus::Active } else { EngineStatus::Ready };
        self.uuid = uuid;
        self.version = version;

        if self.snapshot() != before {
            self.events.push(DomainEvent::new(
                self.id,
                self.version,
                EngineEventKind::EngineRestored {
                    uuid: self.uuid,
                    status: self.status,
                },
            ));
        }
        true
    }

    pub fn is_dead(&self) -> bool {
        self.status == EngineStatus::Dead
    }

    /// Drains and returns events raised since the last call. Mirrors the
    /// "collect pending events" step every use case performs right before
    /// handing them to the outbox.
    pub fn pull_events(&mut self) -> Vec<DomainEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Engine {
        Engine::new_ready(Uuid::new_v4(), None, "10.0.0.1:443".into(), Version::new(100, 0))
    }

    #[test]
    fn new_engine_is_ready_even_when_running() {
        let e = engine();
        assert_eq!(e.status, EngineStatus::Ready);
    }

    #[test]
    fn stale_version_is_silently_rejected() {
        let mut e = engine();
        let applied = e.update(true, None, Version::new(99, 0));
        assert!(!applied);
        assert_eq!(e.version, Version::new(100, 0));
        assert!(e.pull_events().is_empty());
    }

    #[test]
    fn duplicate_version_is_silently_rejected() {
        let mut e = engine();
        let applied = e.update(true, None, Version::new(100, 0));
        assert!(!applied);
    }

    #[test]
    fn no_op_update_still_advances_version_without_event() {
        let mut e = engine();
        // running flips Ready -> Active, so this one *does* change state.
        e.update(true, None, Version::new(101, 0));
        e.pull_events();

        // Same observable state, newer version: version advances, no event.
        let applied = e.update(true, None, Version::new(102, 0));
        assert!(applied);
        assert_eq!(e.version, Version::new(102, 0));
        assert!(e.pull_events().is_empty());
    }

    #[test]
    fn changed_state_raises_engine_updated() {
        let mut e = engine();
        e.update(true, None, Version::new(101, 0));
        let events = e.pull_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "EngineUpdated");
    }

    #[test]
    fn addr_is_immutable_after_insert() {
        let mut e = engine();
        e.update(true, None, Version::new(101, 0));
        assert_eq!(e.addr, "10.0.0.1:443");
    }

    #[test]
    fn mark_dead_raises_engine_dead() {
        let mut e = engine();
        e.mark_dead(Version::new(101, 0));
        let events = e.pull_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "EngineDead");
        assert!(e.is_dead());
    }

    #[test]
    fn repeated_mark_dead_still_emits() {
        let mut e = engine();
        e.mark_dead(Version::new(101, 0));
        e.pull_events();

        // A second expiry notification for an already-dead engine: status
        // and uuid are unchanged, but mark_dead has no no-op path like
        // update does — it always emits once the version check passes.
        e.mark_dead(Version::new(102, 0));
        let events = e.pull_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "EngineDead");
    }

    #[test]
    fn restore_raises_engine_restored() {
        let mut e = engine();
        e.mark_dead(Version::new(101, 0));
        e.pull_events();

        e.restore(true, Some(Uuid::new_v4()), Version::new(102, 0));
        let events = e.pull_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "EngineRestored");
        assert!(!e.is_dead());
        assert_eq!(e.addr, "10.0.0.1:443");
    }
}
