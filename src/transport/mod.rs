//! # Transport Layer
//!
//! TCP plumbing shared by the relay server and client.
//!
//! ## Components
//! - **TCP**: Framed connect with timeout and the per-connection server loop
//!
//! Every connection carries [`PacketCodec`](crate::core::codec::PacketCodec)
//! frames over a plain TCP stream; there is no transport encryption.

pub mod tcp;
