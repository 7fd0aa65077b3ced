//! Address-keyed channel cache.
//!
//! Unlike a round-robin pool over a fixed set of backends, the restart RPC
//! client talks to however many distinct engine addresses show up in the
//! fleet, discovered one at a time as restarts are requested. A channel is
//! created once per address and reused forever after — there's no
//! eviction, since the addresses are the whole, small, slowly-changing
//! fleet and tonic's `Channel` is itself backed by a connection pool with
//! its own keepalive/reconnect behavior.

use std::time::Duration;

use dashmap::DashMap;
use tonic::transport::{Channel, Endpoint};

#[derive(Clone)]
pub struct TlsConfig {
    pub root_certificates_pem: Vec<u8>,
}

pub struct ChannelPool {
    channels: DashMap<String, Channel>,
    tls: Option<TlsConfig>,
    connect_timeout: Duration,
}

impl ChannelPool {
    pub fn new(tls: Option<TlsConfig>) -> Self {
        Self {
            channels: DashMap::new(),
            tls,
            connect_timeout: Duration::from_secs(5),
        }
    }

    /// Returns the cached channel for `addr`, connecting and caching it on
    /// first use. `addr` is `host:port`; a trailing dot on the host (a
    /// fully-qualified-domain-name artifact some DNS sources leave behind)
    /// is normalized away before it reaches the TLS authority checks, where
    /// it would otherwise fail a hostname match that should succeed.
    pub async fn get_or_connect(&self, addr: &str) -> Result<Channel, tonic::transport::Error> {
        let addr = normalize_addr(addr);
        if let Some(channel) = self.channels.get(&addr) {
            return Ok(channel.clone());
        }

        let channel = self.connect(&addr).await?;
        self.channels.insert(addr, channel.clone());
        Ok(channel)
    }

    async fn connect(&self, addr: &str) -> Result<Channel, tonic::transport::Error> {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        let uri = format!("{scheme}://{addr}");
        let mut endpoint = Endpoint::from_shared(uri)?.connect_timeout(self.connect_timeout);

        if let Some(tls) = &self.tls {
            let host = host_only(addr);
            let tls_config = tonic::transport::ClientTlsConfig::new()
                .ca_certificate(tonic::transport::Certificate::from_pem(&tls.root_certificates_pem))
                .domain_name(host);
            endpoint = endpoint.tls_config(tls_config)?;
        }

        endpoint.connect().await
    }
}

fn normalize_addr(addr: &str) -> String {
    match addr.rsplit_once(':') {
        Some((host, port)) => format!("{}:{port}", strip_trailing_dot(host)),
        None => strip_trailing_dot(addr).to_string(),
    }
}

fn host_only(addr: &str) -> String {
    addr.rsplit_once(':').map(|(h, _)| h).unwrap_or(addr).to_string()
}

fn strip_trailing_dot(host: &str) -> &str {
    host.strip_suffix('.').unwrap_or(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_dot_from_host_keeping_port() {
        assert_eq!(normalize_addr("engine1.internal.:443"), "engine1.internal:443");
        assert_eq!(normalize_addr("engine1.internal:443"), "engine1.internal:443");
    }

    #[test]
    fn handles_addr_with_no_port() {
        assert_eq!(normalize_addr("engine1.internal."), "engine1.internal");
    }
}
