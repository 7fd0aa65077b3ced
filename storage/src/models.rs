//! Row types for the outbox and delivery-task tables. These are
//! persistence-shaped, not domain-shaped: the domain event payload is kept
//! as opaque JSON here and only interpreted again by the fan-out planner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub version: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
    /// The ingress message this event was produced while handling.
    /// Constant across every event raised by the same handler invocation.
    pub caused_by: String,
    pub fanned_out: bool,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct BotDeliveryTask {
    pub id: Uuid,
    pub outbox_id: Uuid,
    pub subscription_id: Uuid,
    pub published: bool,
    pub attempts: i32,
    pub next_attempt_at: DateTime<Utc>,
}
