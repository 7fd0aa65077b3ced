pub mod config;
pub mod consumer;
pub mod handler;
pub mod reclaimer;
pub mod stream;

pub use config::Config;
pub use consumer::Consumer;
pub use reclaimer::Reclaimer;
pub use stream::StreamClient;
