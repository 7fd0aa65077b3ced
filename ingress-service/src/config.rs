use serde::Deserialize;

/// Canonical defaults match the original service's stream constants: a
/// 60s idle threshold before a pending entry is eligible for reclaim, 100
/// entries per batch, a 5s pause between empty reclaim rounds, and at most
/// 2 delivery attempts before a message is dead-lettered.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,

    #[serde(default = "default_stream_name")]
    pub stream_name: String,
    #[serde(default = "default_dlq_stream_name")]
    pub dlq_stream_name: String,
    #[serde(default = "default_group")]
    pub consumer_group: String,

    #[serde(default = "default_idle_ms")]
    pub idle_ms: i64,
    #[serde(default = "default_batch")]
    pub batch_size: i64,
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
    #[serde(default = "default_max_retry")]
    pub max_retry: i64,
}

fn default_stream_name() -> String {
    "xray_engines".into()
}
fn default_dlq_stream_name() -> String {
    "xray_engines:dlq".into()
}
fn default_group() -> String {
    "xray_engines".into()
}
fn default_idle_ms() -> i64 {
    60_000
}
fn default_batch() -> i64 {
    100
}
fn default_pause_secs() -> u64 {
    5
}
fn default_max_retry() -> i64 {
    2
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::prefixed("INGRESS_").from_env::<Config>()?)
    }

    pub fn consumer_name(&self) -> String {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown-host".into());
        format!("{host}-{}", uuid::Uuid::new_v4())
    }
}
