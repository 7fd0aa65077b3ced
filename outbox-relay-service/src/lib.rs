pub mod config;
pub mod fanout;
pub mod relay;

pub use config::Config;
pub use relay::OutboxRelay;
