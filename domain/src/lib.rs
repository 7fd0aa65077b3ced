pub mod engine;
pub mod event;
pub mod version;

pub use engine::{Engine, EngineStatus};
pub use event::{DomainEvent, EngineEventKind, EVENT_NAMESPACE};
pub use version::{Version, VersionParseError};
