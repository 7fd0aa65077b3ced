//! Database pool configuration.
//!
//! The service layer draws a line between two kinds of database work: plain
//! autocommit reads used for the cheap existence/lookup checks, and
//! transactional sessions used for the guarded engine upsert and the outbox
//! drain. Both get their own pool so a burst of long-held transactional
//! connections can't starve the read-only checks (and vice versa).

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct DbConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConfig")
            .field("database_url", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl DbConfig {
    /// Pool sized for the plain/autocommit read path: small, since reads are
    /// short and frequent.
    pub fn plain(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 8,
            min_connections: 2,
            ..Default::default()
        }
    }

    /// Pool sized for the transactional path, which holds connections for
    /// the duration of an upsert or an outbox/task claim-and-mark cycle.
    pub fn transactional(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 16,
            min_connections: 2,
            ..Default::default()
        }
    }

    pub async fn build_pool(&self) -> Result<PgPool> {
        let opts = PgConnectOptions::from_str(&self.database_url)
            .context("invalid database url")?;
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .idle_timeout(Duration::from_secs(self.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(self.max_lifetime_secs))
            .connect_with(opts)
            .await
            .context("failed to build postgres pool")?;
        info!(max_connections = self.max_connections, "postgres pool ready");
        Ok(pool)
    }
}

/// The two pools a session needs: a plain pool for autocommit reads and a
/// transactional pool for guarded writes. Mirrors the plain/tx engine split
/// the composition root wires up for every worker.
#[derive(Clone)]
pub struct DbPools {
    pub plain: PgPool,
    pub tx: PgPool,
}

impl DbPools {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let plain = DbConfig::plain(database_url).build_pool().await?;
        let tx = DbConfig::transactional(database_url).build_pool().await?;
        Ok(Self { plain, tx })
    }
}
