//! Synchronous-from-the-caller's-perspective restart RPC client: `restart`
//! resolves only once the remote engine has actually acknowledged (or the
//! retries are exhausted), there is no fire-and-forget mode.

use error_types::{DomainError, UuidMismatchError};
use resilience::{with_retry, RetryConfig};
use uuid::Uuid;

use crate::pool::{ChannelPool, TlsConfig};
use crate::proto::xray_client::XrayClient;
use crate::proto::XrayInfo;

pub struct EngineRpcClient {
    pool: ChannelPool,
    retry: RetryConfig,
}

impl EngineRpcClient {
    pub fn new(tls: Option<TlsConfig>) -> Self {
        Self {
            pool: ChannelPool::new(tls),
            // 3 total attempts (max_attempts is retries *after* the first),
            // per the restart RPC's bounded-retry contract.
            retry: RetryConfig {
                max_attempts: 2,
                ..RetryConfig::default()
            },
        }
    }

    /// Restarts the engine at `addr` and verifies it reports back the uuid
    /// we expected. A mismatch means `addr` now points at a different
    /// engine than the one the caller thinks it does, which is a distinct
    /// failure from "the call failed" and is never retried.
    pub async fn restart(&self, addr: &str, expected_uuid: Uuid) -> Result<(), DomainError> {
        let channel = self
            .pool
            .get_or_connect(addr)
            .await
            .map_err(|e| DomainError::Transport(e.to_string()))?;

        let response = with_retry(&self.retry, || {
            let mut client = XrayClient::new(channel.clone());
            let request = XrayInfo {
                uuid: expected_uuid.to_string(),
            };
            async move { client.restart_xray(request).await }
        })
        .await
        .map_err(|e| DomainError::from(e.into_inner()))?;

        let received: Uuid = response
            .into_inner()
            .uuid
            .parse()
            .map_err(|_| DomainError::Transport("engine returned a malformed uuid".into()))?;

        if received != expected_uuid {
            return Err(DomainError::from(UuidMismatchError {
                expected: expected_uuid,
                received,
            }));
        }
        Ok(())
    }
}
