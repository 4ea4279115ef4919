//! # Payload Codecs
//!
//! Per-packet payload layouts and the ordered registry that maps wire type
//! ids to them.
//!
//! ## Layouts
//! ```text
//! idx  packet               payload
//!  0   KeepAlive            (empty)
//!  1   NewCodeRequest       (empty)
//!  2   NewCodeResponse      code..
//!  3   NewCodeComplete      ticket_len:u16 ticket code..
//!  4   QueryStatusRequest   code..
//!  5   QueryStatusResponse  has_ticket:u8 [ticket_len:u16 ticket] code..
//!  6   CodeInfoUpdate       captcha_type:u16 data_len:u16 data code..
//!  7   CodeInfoRefresh      code..
//!  8   CodeInfoQuery        code..
//!  9   CodeInfoResponse     captcha_type:u16 data_len:u16 data code..
//! ```
//! `code..` is every remaining payload byte, so it is always the last field.
//! All integers are big-endian. The index order is part of the wire
//! compatibility contract and must never be reshuffled.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::packet::{Packet, PacketKind};
use crate::error::constants::{ERR_TRUNCATED_BYTES, ERR_TRUNCATED_FIELD};
use crate::error::{ProtocolError, Result};

/// Encode/decode logic for one packet payload.
pub trait PayloadCodec: Send + Sync {
    /// Packet variant handled by this codec.
    fn kind(&self) -> PacketKind;

    /// Write the payload of `packet` (header excluded) into `dst`.
    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()>;

    /// Parse a complete payload. `payload` holds exactly the frame body.
    fn decode(&self, payload: Bytes) -> Result<Packet>;

    /// Whether this codec serializes `packet`.
    fn matches(&self, packet: &Packet) -> bool {
        packet.kind() == self.kind()
    }
}

fn malformed(kind: PacketKind, reason: &'static str) -> ProtocolError {
    ProtocolError::MalformedPayload {
        packet: kind.name(),
        reason,
    }
}

// Only reachable when a codec is driven directly with the wrong variant.
fn mismatch(packet: &Packet) -> ProtocolError {
    ProtocolError::UnregisteredPacket(packet.kind().name())
}

fn get_u16(kind: PacketKind, buf: &mut Bytes) -> Result<u16> {
    if buf.remaining() < 2 {
        return Err(malformed(kind, ERR_TRUNCATED_FIELD));
    }
    Ok(buf.get_u16())
}

fn get_u8(kind: PacketKind, buf: &mut Bytes) -> Result<u8> {
    if !buf.has_remaining() {
        return Err(malformed(kind, ERR_TRUNCATED_FIELD));
    }
    Ok(buf.get_u8())
}

fn take(kind: PacketKind, buf: &mut Bytes, len: usize) -> Result<Bytes> {
    if buf.remaining() < len {
        return Err(malformed(kind, ERR_TRUNCATED_BYTES));
    }
    Ok(buf.split_to(len))
}

fn put_prefixed(field: &'static str, bytes: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: bytes.len(),
    })?;
    dst.put_u16(len);
    dst.put_slice(bytes);
    Ok(())
}

/// Shared layout of `CodeInfoUpdate` and `CodeInfoResponse`.
/// A zero `data_len` means "no data", so `Some(empty)` reads back as `None`.
fn put_code_info(
    captcha_type: u16,
    captcha_data: Option<&Bytes>,
    code: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    dst.put_u16(captcha_type);
    match captcha_data {
        Some(data) => put_prefixed("captcha_data", data, dst)?,
        None => dst.put_u16(0),
    }
    dst.put_slice(code);
    Ok(())
}

fn get_code_info(kind: PacketKind, mut payload: Bytes) -> Result<(u16, Option<Bytes>, Bytes)> {
    let captcha_type = get_u16(kind, &mut payload)?;
    let len = get_u16(kind, &mut payload)? as usize;
    let captcha_data = if len == 0 {
        None
    } else {
        Some(take(kind, &mut payload, len)?)
    };
    Ok((captcha_type, captcha_data, payload))
}

/// Codec for packets that carry nothing.
struct EmptyCodec {
    kind: PacketKind,
    packet: fn() -> Packet,
}

impl PayloadCodec for EmptyCodec {
    fn kind(&self) -> PacketKind {
        self.kind
    }

    fn encode(&self, packet: &Packet, _dst: &mut BytesMut) -> Result<()> {
        if !self.matches(packet) {
            return Err(mismatch(packet));
        }
        Ok(())
    }

    /// Any payload bytes are ignored.
    fn decode(&self, _payload: Bytes) -> Result<Packet> {
        Ok((self.packet)())
    }
}

/// Codec for packets whose whole payload is the code.
struct CodeOnlyCodec {
    kind: PacketKind,
    packet: fn(Bytes) -> Packet,
}

impl PayloadCodec for CodeOnlyCodec {
    fn kind(&self) -> PacketKind {
        self.kind
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        match packet.code() {
            Some(code) if self.matches(packet) => {
                dst.put_slice(code);
                Ok(())
            }
            _ => Err(mismatch(packet)),
        }
    }

    fn decode(&self, payload: Bytes) -> Result<Packet> {
        Ok((self.packet)(payload))
    }
}

struct NewCodeCompleteCodec;

impl PayloadCodec for NewCodeCompleteCodec {
    fn kind(&self) -> PacketKind {
        PacketKind::NewCodeComplete
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        let Packet::NewCodeComplete { code, ticket } = packet else {
            return Err(mismatch(packet));
        };
        put_prefixed("ticket", ticket, dst)?;
        dst.put_slice(code);
        Ok(())
    }

    fn decode(&self, mut payload: Bytes) -> Result<Packet> {
        let len = get_u16(self.kind(), &mut payload)? as usize;
        let ticket = take(self.kind(), &mut payload, len)?;
        Ok(Packet::NewCodeComplete {
            code: payload,
            ticket,
        })
    }
}

struct QueryStatusResponseCodec;

impl PayloadCodec for QueryStatusResponseCodec {
    fn kind(&self) -> PacketKind {
        PacketKind::QueryStatusResponse
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        let Packet::QueryStatusResponse { code, ticket } = packet else {
            return Err(mismatch(packet));
        };
        match ticket {
            Some(ticket) => {
                dst.put_u8(1);
                put_prefixed("ticket", ticket, dst)?;
            }
            None => dst.put_u8(0),
        }
        dst.put_slice(code);
        Ok(())
    }

    fn decode(&self, mut payload: Bytes) -> Result<Packet> {
        // Any non-zero flag counts as present.
        let ticket = if get_u8(self.kind(), &mut payload)? != 0 {
            let len = get_u16(self.kind(), &mut payload)? as usize;
            Some(take(self.kind(), &mut payload, len)?)
        } else {
            None
        };
        Ok(Packet::QueryStatusResponse {
            code: payload,
            ticket,
        })
    }
}

struct CodeInfoUpdateCodec;

impl PayloadCodec for CodeInfoUpdateCodec {
    fn kind(&self) -> PacketKind {
        PacketKind::CodeInfoUpdate
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        let Packet::CodeInfoUpdate {
            code,
            captcha_type,
            captcha_data,
        } = packet
        else {
            return Err(mismatch(packet));
        };
        put_code_info(*captcha_type, captcha_data.as_ref(), code, dst)
    }

    fn decode(&self, payload: Bytes) -> Result<Packet> {
        let (captcha_type, captcha_data, code) = get_code_info(self.kind(), payload)?;
        Ok(Packet::CodeInfoUpdate {
            code,
            captcha_type,
            captcha_data,
        })
    }
}

struct CodeInfoResponseCodec;

impl PayloadCodec for CodeInfoResponseCodec {
    fn kind(&self) -> PacketKind {
        PacketKind::CodeInfoResponse
    }

    fn encode(&self, packet: &Packet, dst: &mut BytesMut) -> Result<()> {
        let Packet::CodeInfoResponse {
            code,
            captcha_type,
            captcha_data,
        } = packet
        else {
            return Err(mismatch(packet));
        };
        put_code_info(*captcha_type, captcha_data.as_ref(), code, dst)
    }

    fn decode(&self, payload: Bytes) -> Result<Packet> {
        let (captcha_type, captcha_data, code) = get_code_info(self.kind(), payload)?;
        Ok(Packet::CodeInfoResponse {
            code,
            captcha_type,
            captcha_data,
        })
    }
}

static KEEP_ALIVE: EmptyCodec = EmptyCodec {
    kind: PacketKind::KeepAlive,
    packet: || Packet::KeepAlive,
};
static NEW_CODE_REQUEST: EmptyCodec = EmptyCodec {
    kind: PacketKind::NewCodeRequest,
    packet: || Packet::NewCodeRequest,
};
static NEW_CODE_RESPONSE: CodeOnlyCodec = CodeOnlyCodec {
    kind: PacketKind::NewCodeResponse,
    packet: |code| Packet::NewCodeResponse { code },
};
static QUERY_STATUS_REQUEST: CodeOnlyCodec = CodeOnlyCodec {
    kind: PacketKind::QueryStatusRequest,
    packet: |code| Packet::QueryStatusRequest { code },
};
static CODE_INFO_REFRESH: CodeOnlyCodec = CodeOnlyCodec {
    kind: PacketKind::CodeInfoRefresh,
    packet: |code| Packet::CodeInfoRefresh { code },
};
static CODE_INFO_QUERY: CodeOnlyCodec = CodeOnlyCodec {
    kind: PacketKind::CodeInfoQuery,
    packet: |code| Packet::CodeInfoQuery { code },
};

/// Registry used by builds that predate the `CodeInfo` packets.
static BASE_CODECS: [&dyn PayloadCodec; 6] = [
    &KEEP_ALIVE,
    &NEW_CODE_REQUEST,
    &NEW_CODE_RESPONSE,
    &NewCodeCompleteCodec,
    &QUERY_STATUS_REQUEST,
    &QueryStatusResponseCodec,
];

static FULL_CODECS: [&dyn PayloadCodec; 10] = [
    &KEEP_ALIVE,
    &NEW_CODE_REQUEST,
    &NEW_CODE_RESPONSE,
    &NewCodeCompleteCodec,
    &QUERY_STATUS_REQUEST,
    &QueryStatusResponseCodec,
    &CodeInfoUpdateCodec,
    &CODE_INFO_REFRESH,
    &CODE_INFO_QUERY,
    &CodeInfoResponseCodec,
];

/// Ordered, immutable list of payload codecs. The position of a codec is
/// its wire type id.
#[derive(Clone, Copy)]
pub struct CodecRegistry {
    codecs: &'static [&'static dyn PayloadCodec],
}

impl CodecRegistry {
    /// All ten packet kinds.
    pub fn full() -> Self {
        Self {
            codecs: &FULL_CODECS,
        }
    }

    /// Reduced profile: ids 0..=5 only, no `CodeInfo` packets.
    pub fn base() -> Self {
        Self {
            codecs: &BASE_CODECS,
        }
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }

    /// Codec for an inbound type id.
    #[inline]
    pub fn get(&self, type_id: u16) -> Option<&'static dyn PayloadCodec> {
        self.codecs.get(type_id as usize).copied()
    }

    /// Type id and codec for an outbound packet. First match wins.
    #[inline]
    pub fn lookup(&self, packet: &Packet) -> Option<(u16, &'static dyn PayloadCodec)> {
        self.codecs
            .iter()
            .position(|codec| codec.matches(packet))
            .map(|idx| (idx as u16, self.codecs[idx]))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::full()
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.kind()))
            .finish()
    }
}
