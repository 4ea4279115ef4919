//! # Frame Codec
//!
//! Tokio codec that frames a byte stream into [`Packet`]s and back.
//!
//! ```text
//! [type_id: u16 BE] [payload_len: u16 BE] [payload: payload_len bytes]
//! ```
//!
//! Decoding never consumes bytes until a whole frame is buffered, so arbitrary
//! TCP segmentation is handled by simply waiting for more input. An unknown
//! `type_id` is reported with the buffer left exactly as it was.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::packet::Packet;
use crate::core::payload::CodecRegistry;
use crate::error::{ProtocolError, Result};

/// Size of the frame header in bytes.
pub const HEADER_LEN: usize = 4;

/// Largest payload a frame can describe.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Framer over a [`CodecRegistry`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec {
    registry: CodecRegistry,
}

impl PacketCodec {
    /// Codec with the full packet set.
    pub fn new() -> Self {
        Self::with_registry(CodecRegistry::full())
    }

    pub fn with_registry(registry: CodecRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> CodecRegistry {
        self.registry
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let type_id = u16::from_be_bytes([src[0], src[1]]);
        let payload_len = u16::from_be_bytes([src[2], src[3]]) as usize;
        let frame_len = HEADER_LEN + payload_len;

        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        let codec = self
            .registry
            .get(type_id)
            .ok_or(ProtocolError::UnknownPacketType(type_id))?;

        let mut frame = src.split_to(frame_len).freeze();
        frame.advance(HEADER_LEN);
        codec.decode(frame).map(Some)
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        <Self as Encoder<&Packet>>::encode(self, &item, dst)
    }
}

impl Encoder<&Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: &Packet, dst: &mut BytesMut) -> Result<()> {
        let (type_id, codec) = self
            .registry
            .lookup(item)
            .ok_or(ProtocolError::UnregisteredPacket(item.kind().name()))?;

        let frame_start = dst.len();
        dst.reserve(HEADER_LEN);
        dst.put_u16(type_id);
        dst.put_u16(0);

        if let Err(e) = codec.encode(item, dst) {
            dst.truncate(frame_start);
            return Err(e);
        }

        let payload_len = dst.len() - frame_start - HEADER_LEN;
        if payload_len > MAX_PAYLOAD_LEN {
            dst.truncate(frame_start);
            return Err(ProtocolError::OversizedPayload(payload_len));
        }

        dst[frame_start + 2..frame_start + HEADER_LEN]
            .copy_from_slice(&(payload_len as u16).to_be_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_header_backpatch() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(
                Packet::NewCodeResponse {
                    code: Bytes::from_static(b"12345678"),
                },
                &mut buf,
            )
            .unwrap();

        assert_eq!(&buf[..4], &[0x00, 0x02, 0x00, 0x08]);
        assert_eq!(&buf[4..], b"12345678");
    }

    #[test]
    fn test_empty_packets_are_bare_headers() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Packet::KeepAlive, &mut buf).unwrap();
        codec.encode(Packet::NewCodeRequest, &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_oversized_payload_leaves_buffer_clean() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Packet::KeepAlive, &mut buf).unwrap();

        let err = codec
            .encode(
                Packet::NewCodeResponse {
                    code: Bytes::from(vec![b'0'; MAX_PAYLOAD_LEN + 1]),
                },
                &mut buf,
            )
            .unwrap_err();
        assert!(matches!(err, ProtocolError::OversizedPayload(65536)));
        assert_eq!(buf.len(), HEADER_LEN);
    }

    #[test]
    fn test_unregistered_packet_in_base_profile() {
        let mut codec = PacketCodec::with_registry(CodecRegistry::base());
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Packet::code_info_query(&b"00000000"[..]), &mut buf)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnregisteredPacket("CodeInfoQuery")));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_header_waits() {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x02, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }
}
