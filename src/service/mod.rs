//! # Relay Services
//!
//! The two ends of the relay.
//!
//! ## Components
//! - **Server**: Accept loop over a shared session registry with graceful shutdown
//! - **Client**: Auto-reconnecting connection with keepalive and offline queueing

pub mod client;
pub mod server;

pub use client::RelayClient;
pub use server::RelayServer;
