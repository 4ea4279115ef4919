//! # captcha-relay
//!
//! Length-prefixed binary relay protocol for captcha resolution sessions.
//!
//! A resolver client and a coordinating server exchange short "process codes",
//! the captcha challenge attached to each code, and the ticket a solver
//! eventually produces for it. This crate provides both ends:
//!
//! - [`core`]: packet types, payload layouts and the tokio frame codec
//! - [`session`]: the server's sharded session registry and its expiry sweep
//! - [`protocol`]: request dispatch on the server and inbound events on the client
//! - [`transport`]: TCP connect/accept helpers and the per-connection loop
//! - [`service`]: [`RelayServer`] and the auto-reconnecting [`RelayClient`]
//! - [`config`], [`utils`]: configuration, logging, metrics and timeouts
//!
//! ## Example
//! ```no_run
//! use captcha_relay::config::RelayConfig;
//! use captcha_relay::{ClientEvent, RelayClient, RelayServer};
//!
//! # async fn run() -> captcha_relay::error::Result<()> {
//! let config = RelayConfig::default();
//! let server = RelayServer::bind(&config.server).await?;
//! let addr = server.local_addr()?;
//! tokio::spawn(server.run());
//!
//! let (client, mut events) = RelayClient::new(config.client);
//! client.connect_to(addr.to_string())?;
//! client.request_new_code();
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::NewCode { code } = event {
//!         client.complete_ticket(code, &b"solved-ticket"[..]);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;
pub mod utils;

pub use crate::core::codec::PacketCodec;
pub use crate::core::packet::{CaptchaInfo, Packet, PacketKind};
pub use crate::core::payload::CodecRegistry;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::event::ClientEvent;
pub use crate::service::client::RelayClient;
pub use crate::service::server::RelayServer;
pub use crate::session::registry::SessionRegistry;
