pub mod client;
pub mod pool;

pub mod proto {
    tonic::include_proto!("xray");
}

pub use client::EngineRpcClient;
pub use pool::{ChannelPool, TlsConfig};
