//! # Protocol Layer
//!
//! What each end does with a decoded packet.
//!
//! ## Components
//! - **Dispatcher**: Server-side request handling against the session registry
//! - **Event**: Client-side translation of inbound packets into [`event::ClientEvent`]s
//!
//! Neither component touches sockets. Both map one packet to at most one
//! outcome, which keeps them testable without a network.

pub mod dispatcher;
pub mod event;
