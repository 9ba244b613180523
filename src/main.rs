//! Server entry point
//!
//! Configuration comes from the environment:
//! - `PEERHUB_ADDR` - bind address (default `0.0.0.0:9000`)
//! - `PEERHUB_HEARTBEAT_TIMEOUT_SECS` - reap clients silent for this long
//! - `PEERHUB_REAP_INTERVAL_SECS` - how often the reaper scans
//! - `RUST_LOG` - tracing filter (default `peerhub=info`)

use peerhub::{ServerConfig, SignalingServer};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn env_secs(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .map(Duration::from_secs)
}

fn config_from_env() -> ServerConfig {
    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("PEERHUB_ADDR") {
        config.bind_addr = addr;
    }
    if let Some(timeout) = env_secs("PEERHUB_HEARTBEAT_TIMEOUT_SECS") {
        config.heartbeat_timeout = timeout;
    }
    if let Some(interval) = env_secs("PEERHUB_REAP_INTERVAL_SECS") {
        config.reap_interval = interval;
    }
    config
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("peerhub=info")),
        )
        .init();

    let server = SignalingServer::new(config_from_env());

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
    }
}
