//! Example: One captcha session from the client side
//!
//! Allocates a code, publishes captcha data for it, completes it as a
//! solver would, then polls the ticket back. Start `relay_server` first.
//!
//! Run with: `cargo run --example relay_client`

use bytes::Bytes;
use captcha_relay::config::RelayConfig;
use captcha_relay::core::packet::display_code;
use captcha_relay::protocol::event::ClientEvent;
use captcha_relay::service::client::RelayClient;
use captcha_relay::utils::logging::init_logging;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RelayConfig::from_env()?;
    config.validate_strict()?;
    init_logging(&config.logging);

    let (client, mut events) = RelayClient::new(config.client.clone());
    // Queued until the first connection comes up.
    client.request_new_code();
    client.connect()?;

    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("Gave up waiting for the relay");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    ClientEvent::Connected => info!(address = ?client.address(), "Connected"),
                    ClientEvent::ConnectionLost => warn!("Connection lost, retrying"),
                    ClientEvent::NewCode { code } => {
                        info!(code = %display_code(&code), "Allocated code");
                        client.update_captcha_info(
                            code.clone(),
                            1,
                            Some(Bytes::from_static(b"{\"gt\":\"demo\",\"challenge\":\"demo\"}")),
                        );
                        client.query_captcha_info(code.clone());
                        client.complete_ticket(code.clone(), &b"demo-ticket"[..]);
                        client.query_ticket(code);
                    }
                    ClientEvent::CaptchaInfo(info) => {
                        info!(
                            code = %display_code(&info.code),
                            captcha_type = info.captcha_type,
                            has_data = info.captcha_data.is_some(),
                            "Captcha info"
                        );
                    }
                    ClientEvent::Ticket { code, ticket } => {
                        info!(
                            code = %display_code(&code),
                            ticket = %String::from_utf8_lossy(&ticket),
                            "Ticket received"
                        );
                        break;
                    }
                    ClientEvent::Unhandled(packet) => warn!(kind = ?packet.kind(), "Unexpected packet"),
                }
            }
        }
    }

    client.disconnect();
    Ok(())
}
