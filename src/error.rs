//! # Error Types
//!
//! Error handling for the relay protocol.
//!
//! This module defines every error that can surface from the codec, the
//! session server and the reconnecting client.
//!
//! ## Error Categories
//! - **I/O Errors**: Network failures (refused, reset, timed out)
//! - **Framing Errors**: Unknown type ids, malformed or oversized payloads
//! - **Lifecycle Errors**: Operations against a closed or already started client
//! - **Configuration Errors**: Unreadable or invalid configuration
//!
//! Framing errors are fatal to the connection that produced them. Nothing in
//! this module is ever sent over the wire: the protocol only knows "absent"
//! tickets and captcha data, everything else is success or teardown.
//!
//! ## Example Usage
//! ```rust
//! use captcha_relay::core::codec::PacketCodec;
//! use captcha_relay::error::ProtocolError;
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//!
//! let mut codec = PacketCodec::new();
//! let mut buf = BytesMut::from(&[0xFF, 0xFF, 0x00, 0x00][..]);
//! match codec.decode(&mut buf) {
//!     Err(ProtocolError::UnknownPacketType(id)) => assert_eq!(id, 0xFFFF),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Payload layout errors
    pub const ERR_TRUNCATED_FIELD: &str = "payload ended inside a fixed-width field";
    pub const ERR_TRUNCATED_BYTES: &str = "length prefix exceeds remaining payload";
}

// ProtocolError is the primary error type for all relay operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unknown packet type id: {0}")]
    UnknownPacketType(u16),

    #[error("Malformed {packet} payload: {reason}")]
    MalformedPayload {
        packet: &'static str,
        reason: &'static str,
    },

    #[error("Payload too large: {0} bytes (max 65535)")]
    OversizedPayload(usize),

    #[error("Field {field} too long: {len} bytes (max 65535)")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("No codec registered for packet {0}")]
    UnregisteredPacket(&'static str),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out (no activity)")]
    ConnectionTimeout,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Client is already connected or connecting")]
    AlreadyConnected,

    #[error("Connection was closed")]
    Disconnected,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error came from the framing layer (bad bytes on the wire)
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::UnknownPacketType(_)
                | ProtocolError::MalformedPayload { .. }
                | ProtocolError::OversizedPayload(_)
                | ProtocolError::FieldTooLong { .. }
                | ProtocolError::UnregisteredPacket(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framing_classification() {
        assert!(ProtocolError::UnknownPacketType(42).is_framing());
        assert!(ProtocolError::OversizedPayload(70_000).is_framing());
        assert!(!ProtocolError::ConnectionTimeout.is_framing());
        assert!(!ProtocolError::Io(io::Error::other("reset")).is_framing());
    }

    #[test]
    fn test_display_messages() {
        let err = ProtocolError::MalformedPayload {
            packet: "NewCodeComplete",
            reason: constants::ERR_TRUNCATED_BYTES,
        };
        assert_eq!(
            err.to_string(),
            "Malformed NewCodeComplete payload: length prefix exceeds remaining payload"
        );
        assert_eq!(
            ProtocolError::Disconnected.to_string(),
            "Connection was closed"
        );
    }
}
