//! Chat-bot transport. Publishing is fire-and-report: a failure is logged
//! and reported back as `false`, never propagated as an error, so one
//! recipient's bad chat id can't take down the rest of the batch.

use async_trait::async_trait;
use tracing::warn;

#[async_trait]
pub trait BotPublisher: Send + Sync {
    async fn publish(&self, telegram_id: i64, event_type: &str, payload: &serde_json::Value) -> bool;
}

pub struct TelegramBotPublisher {
    http: reqwest::Client,
    bot_token: String,
}

impl TelegramBotPublisher {
    pub fn new(bot_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token,
        }
    }

    fn render(event_type: &str, payload: &serde_json::Value) -> String {
        format!("{event_type}: {payload}")
    }
}

#[async_trait]
impl BotPublisher for TelegramBotPublisher {
    async fn publish(&self, telegram_id: i64, event_type: &str, payload: &serde_json::Value) -> bool {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let body = serde_json::json!({
            "chat_id": telegram_id,
            "text": Self::render(event_type, payload),
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), telegram_id, "bot api returned non-success status");
                false
            }
            Err(e) => {
                warn!(error = %e, telegram_id, "bot api request failed");
                false
            }
        }
    }
}
