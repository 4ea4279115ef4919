//! # Core Protocol Components
//!
//! Packet types, payload layouts and the frame codec shared by client and server.
//!
//! ## Components
//! - **Packet**: Typed view of the ten relay packets
//! - **Payload**: Per-packet payload codecs and the ordered codec registry
//! - **Codec**: Tokio codec for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! [TypeId(2)] [Length(2)] [Payload(N)]
//! ```
//!
//! ## Limits
//! - Maximum payload size: 65535 bytes (u16 length prefix)
//! - Type ids index the registry; ids past its end are rejected before decoding

pub mod codec;
pub mod packet;
pub mod payload;
