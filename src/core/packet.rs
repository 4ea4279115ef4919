//! # Packet Types
//!
//! Typed view of every frame the relay protocol carries.
//!
//! Codes, tickets and captcha payloads are opaque byte strings held as
//! [`Bytes`] so that decoded packets share the receive buffer instead of
//! copying out of it.

use bytes::Bytes;
use std::fmt;

/// One relay protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Liveness probe, empty payload. Servers echo it back.
    KeepAlive,
    /// Ask the server to allocate a fresh process code.
    NewCodeRequest,
    /// Server's answer to [`Packet::NewCodeRequest`].
    NewCodeResponse { code: Bytes },
    /// Attach a resolved ticket to a code.
    NewCodeComplete { code: Bytes, ticket: Bytes },
    /// Poll the ticket of a code.
    QueryStatusRequest { code: Bytes },
    /// Ticket of a code; `None` for both "unknown" and "not resolved yet".
    QueryStatusResponse { code: Bytes, ticket: Option<Bytes> },
    /// Store the captcha challenge for a code.
    CodeInfoUpdate {
        code: Bytes,
        captcha_type: u16,
        captcha_data: Option<Bytes>,
    },
    /// Keep a code alive without changing it.
    CodeInfoRefresh { code: Bytes },
    /// Fetch the captcha challenge for a code.
    CodeInfoQuery { code: Bytes },
    /// Captcha challenge of a code; `(0, None)` when unknown.
    CodeInfoResponse {
        code: Bytes,
        captcha_type: u16,
        captcha_data: Option<Bytes>,
    },
}

/// Discriminant of [`Packet`], used for routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    KeepAlive,
    NewCodeRequest,
    NewCodeResponse,
    NewCodeComplete,
    QueryStatusRequest,
    QueryStatusResponse,
    CodeInfoUpdate,
    CodeInfoRefresh,
    CodeInfoQuery,
    CodeInfoResponse,
}

impl PacketKind {
    /// Static name, zero-allocation for log fields and error messages.
    pub const fn name(self) -> &'static str {
        match self {
            PacketKind::KeepAlive => "KeepAlive",
            PacketKind::NewCodeRequest => "NewCodeRequest",
            PacketKind::NewCodeResponse => "NewCodeResponse",
            PacketKind::NewCodeComplete => "NewCodeComplete",
            PacketKind::QueryStatusRequest => "QueryStatusRequest",
            PacketKind::QueryStatusResponse => "QueryStatusResponse",
            PacketKind::CodeInfoUpdate => "CodeInfoUpdate",
            PacketKind::CodeInfoRefresh => "CodeInfoRefresh",
            PacketKind::CodeInfoQuery => "CodeInfoQuery",
            PacketKind::CodeInfoResponse => "CodeInfoResponse",
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        match self {
            Packet::KeepAlive => PacketKind::KeepAlive,
            Packet::NewCodeRequest => PacketKind::NewCodeRequest,
            Packet::NewCodeResponse { .. } => PacketKind::NewCodeResponse,
            Packet::NewCodeComplete { .. } => PacketKind::NewCodeComplete,
            Packet::QueryStatusRequest { .. } => PacketKind::QueryStatusRequest,
            Packet::QueryStatusResponse { .. } => PacketKind::QueryStatusResponse,
            Packet::CodeInfoUpdate { .. } => PacketKind::CodeInfoUpdate,
            Packet::CodeInfoRefresh { .. } => PacketKind::CodeInfoRefresh,
            Packet::CodeInfoQuery { .. } => PacketKind::CodeInfoQuery,
            Packet::CodeInfoResponse { .. } => PacketKind::CodeInfoResponse,
        }
    }

    /// The process code this packet refers to, if it carries one.
    pub fn code(&self) -> Option<&Bytes> {
        match self {
            Packet::KeepAlive | Packet::NewCodeRequest => None,
            Packet::NewCodeResponse { code }
            | Packet::NewCodeComplete { code, .. }
            | Packet::QueryStatusRequest { code }
            | Packet::QueryStatusResponse { code, .. }
            | Packet::CodeInfoUpdate { code, .. }
            | Packet::CodeInfoRefresh { code }
            | Packet::CodeInfoQuery { code }
            | Packet::CodeInfoResponse { code, .. } => Some(code),
        }
    }

    pub fn complete(code: impl Into<Bytes>, ticket: impl Into<Bytes>) -> Self {
        Packet::NewCodeComplete {
            code: code.into(),
            ticket: ticket.into(),
        }
    }

    pub fn query_status(code: impl Into<Bytes>) -> Self {
        Packet::QueryStatusRequest { code: code.into() }
    }

    pub fn code_info_update(
        code: impl Into<Bytes>,
        captcha_type: u16,
        captcha_data: Option<Bytes>,
    ) -> Self {
        Packet::CodeInfoUpdate {
            code: code.into(),
            captcha_type,
            captcha_data,
        }
    }

    pub fn code_info_refresh(code: impl Into<Bytes>) -> Self {
        Packet::CodeInfoRefresh { code: code.into() }
    }

    pub fn code_info_query(code: impl Into<Bytes>) -> Self {
        Packet::CodeInfoQuery { code: code.into() }
    }
}

/// Captcha challenge attached to a process code.
///
/// The relay never interprets `captcha_type` or `captcha_data`; they are
/// produced and consumed by the captcha integration on either end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptchaInfo {
    pub code: Bytes,
    pub captcha_type: u16,
    pub captcha_data: Option<Bytes>,
}

impl From<CaptchaInfo> for Packet {
    fn from(info: CaptchaInfo) -> Self {
        Packet::CodeInfoResponse {
            code: info.code,
            captcha_type: info.captcha_type,
            captcha_data: info.captcha_data,
        }
    }
}

/// Render an opaque code for logs. Codes allocated by the server are ASCII
/// digits; anything else is escaped.
pub fn display_code(code: &[u8]) -> String {
    code.escape_ascii().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_accessor() {
        assert_eq!(Packet::KeepAlive.code(), None);
        assert_eq!(Packet::NewCodeRequest.code(), None);

        let packet = Packet::complete(&b"12345678"[..], &b"ticket"[..]);
        assert_eq!(packet.code().map(|c| c.as_ref()), Some(&b"12345678"[..]));
        assert_eq!(packet.kind(), PacketKind::NewCodeComplete);
    }

    #[test]
    fn test_captcha_info_into_response() {
        let info = CaptchaInfo {
            code: Bytes::from_static(b"00112233"),
            captcha_type: 3,
            captcha_data: Some(Bytes::from_static(b"{\"url\":1}")),
        };
        let packet: Packet = info.into();
        assert_eq!(packet.kind(), PacketKind::CodeInfoResponse);
    }

    #[test]
    fn test_display_code_escapes_binary() {
        assert_eq!(display_code(b"31415926"), "31415926");
        assert_eq!(display_code(&[0x00, b'a']), "\\x00a");
    }
}
