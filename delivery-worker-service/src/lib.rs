pub mod config;
pub mod publisher;
pub mod worker;

pub use config::Config;
pub use publisher::{BotPublisher, TelegramBotPublisher};
pub use worker::DeliveryWorker;
