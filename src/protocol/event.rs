//! Inbound packet routing on the client.

use bytes::Bytes;

use crate::core::packet::{CaptchaInfo, Packet};

/// Everything a [`RelayClient`](crate::service::client::RelayClient) reports
/// to its owner, delivered in arrival order on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A connection was established and queued packets were flushed into it.
    Connected,
    /// The live connection closed; a reconnect is scheduled unless the
    /// client was disconnected.
    ConnectionLost,
    /// The server allocated `code`.
    NewCode { code: Bytes },
    /// `code` has been resolved to `ticket`.
    Ticket { code: Bytes, ticket: Bytes },
    /// Captcha challenge for a code; `(0, None)` if the server does not know it.
    CaptchaInfo(CaptchaInfo),
    /// Any other packet the server sent.
    Unhandled(Packet),
}

impl ClientEvent {
    /// Translate an inbound packet. Keepalives and status responses
    /// without a ticket produce no event.
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::KeepAlive => None,
            Packet::NewCodeResponse { code } => Some(ClientEvent::NewCode { code }),
            Packet::QueryStatusResponse { code, ticket } => {
                ticket.map(|ticket| ClientEvent::Ticket { code, ticket })
            }
            Packet::CodeInfoResponse {
                code,
                captcha_type,
                captcha_data,
            } => Some(ClientEvent::CaptchaInfo(CaptchaInfo {
                code,
                captcha_type,
                captcha_data,
            })),
            other => Some(ClientEvent::Unhandled(other)),
        }
    }
}
