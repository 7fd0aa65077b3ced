//! Dispatches a single stream entry to the engine service.
//!
//! Each entry carries the full engine-info DTO inline as a JSON `payload`
//! field (the `id` in that payload is ignored; the aggregate id always
//! comes from the notification's `key`, which is the authority).

use std::collections::HashMap;

use domain::Version;
use engine_service::EngineService;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

const KEY_PREFIX: &str = "xrayEngines:";

#[derive(Debug, thiserror::Error)]
pub enum HandleError {
    #[error("malformed entry: {0}")]
    Malformed(String),
    #[error(transparent)]
    Domain(#[from] error_types::DomainError),
}

#[derive(Debug, Deserialize)]
struct EngineInfoPayload {
    #[serde(default)]
    running: bool,
    #[serde(default)]
    uuid: Option<Uuid>,
    #[serde(default)]
    addr: String,
}

/// Returns `Ok(true)` if the entry was handled (and should be acked),
/// `Ok(false)` if it was recognized but intentionally skipped (also acked
/// — e.g. a notification for an unrelated key), and `Err` if the handler
/// itself failed and the entry should stay pending for a future retry.
///
/// A `mark_dead` on an already-absent aggregate surfaces
/// `EngineNotExistError` from the service layer; per policy that's logged
/// and acked rather than left pending, since retrying can't make the
/// aggregate appear.
pub async fn handle_entry(
    entry_id: &str,
    fields: &HashMap<String, String>,
    stream_name: &str,
    engine_service: &EngineService,
) -> Result<bool, HandleError> {
    let key = fields
        .get("key")
        .ok_or_else(|| HandleError::Malformed("missing key field".into()))?;

    if !key.starts_with(KEY_PREFIX) {
        return Ok(false);
    }
    let id: Uuid = key[KEY_PREFIX.len()..]
        .parse()
        .map_err(|_| HandleError::Malformed(format!("key {key} is not a valid engine id")))?;

    let event = fields
        .get("event")
        .ok_or_else(|| HandleError::Malformed("missing event field".into()))?;

    let version = Version::from_stream_id(entry_id)
        .map_err(|e| HandleError::Malformed(e.to_string()))?;
    let caused_by = format!("{stream_name}:{entry_id}");

    match event.as_str() {
        "expired" => match engine_service.mark_dead(id, version, &caused_by).await {
            Ok(()) => Ok(true),
            Err(error_types::DomainError::EngineNotExist(_)) => {
                warn!(%id, "mark_dead on absent engine, acking anyway");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        },
        "hset" => {
            let raw = fields
                .get("payload")
                .ok_or_else(|| HandleError::Malformed("hset entry missing payload field".into()))?;
            let info: EngineInfoPayload =
                serde_json::from_str(raw).map_err(|e| HandleError::Malformed(format!("bad payload json: {e}")))?;

            engine_service
                .upsert(id, info.running, info.uuid, info.addr, version, &caused_by)
                .await?;
            Ok(true)
        }
        other => {
            warn!(event = other, %key, "unhandled key event, acking without action");
            Ok(false)
        }
    }
}
