use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub bot_token: String,
    #[serde(default = "default_batch")]
    pub batch_size: i64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
    #[serde(default = "default_empty_pause_ms")]
    pub empty_pause_ms: u64,
}

fn default_batch() -> i64 {
    100
}
fn default_max_attempts() -> i32 {
    5
}
fn default_empty_pause_ms() -> u64 {
    200
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(envy::prefixed("DELIVERY_").from_env::<Config>()?)
    }
}
