//! Example: Standalone relay server
//!
//! Loads configuration from a TOML file (first argument) or from
//! `CAPTCHA_RELAY_*` environment variables, then serves until Ctrl-C.
//!
//! Run with: `cargo run --example relay_server -- relay.toml`

use captcha_relay::config::RelayConfig;
use captcha_relay::service::server::RelayServer;
use captcha_relay::utils::logging::init_logging;
use captcha_relay::utils::metrics::init_metrics;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => RelayConfig::from_file(path)?,
        None => RelayConfig::from_env()?,
    };
    config.validate_strict()?;

    init_logging(&config.logging);
    init_metrics();

    let server = RelayServer::bind(&config.server).await?;
    info!(
        session_ttl_ms = config.server.session_ttl.as_millis() as u64,
        code_length = config.server.code_length,
        "Relay configured"
    );

    server.run().await?;
    Ok(())
}
