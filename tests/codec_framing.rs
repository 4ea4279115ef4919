//! Integration tests for stream framing
//!
//! These tests drive the packet codec the way a socket does: bytes arrive in
//! arbitrary pieces, frames are back to back, and bad frames must not leak
//! into their neighbours.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Buf, Bytes, BytesMut};
use captcha_relay::core::codec::{PacketCodec, HEADER_LEN};
use captcha_relay::core::packet::Packet;
use captcha_relay::error::ProtocolError;
use tokio_util::codec::{Decoder, Encoder};

fn sample_stream() -> Vec<Packet> {
    vec![
        Packet::KeepAlive,
        Packet::NewCodeRequest,
        Packet::NewCodeResponse {
            code: Bytes::from_static(b"31415926"),
        },
        Packet::complete(&b"31415926"[..], &b"ticket-abc"[..]),
        Packet::query_status(&b"31415926"[..]),
        Packet::QueryStatusResponse {
            code: Bytes::from_static(b"31415926"),
            ticket: None,
        },
        Packet::code_info_update(&b"31415926"[..], 3, Some(Bytes::from_static(b"{}"))),
        Packet::code_info_refresh(&b"31415926"[..]),
        Packet::code_info_query(&b"31415926"[..]),
        Packet::CodeInfoResponse {
            code: Bytes::from_static(b"31415926"),
            captcha_type: 0,
            captcha_data: None,
        },
    ]
}

fn encode_all(packets: &[Packet]) -> BytesMut {
    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::new();
    for packet in packets {
        codec.encode(packet, &mut buf).expect("encode");
    }
    buf
}

fn decode_in_chunks(bytes: &[u8], chunk: usize) -> Vec<Packet> {
    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for piece in bytes.chunks(chunk) {
        buf.extend_from_slice(piece);
        while let Some(packet) = codec.decode(&mut buf).expect("decode") {
            out.push(packet);
        }
    }
    assert!(buf.is_empty(), "leftover bytes after full stream");
    out
}

#[test]
fn test_byte_at_a_time_never_emits_early() {
    let packet = Packet::complete(&b"27182818"[..], &b"resolved"[..]);
    let wire = encode_all(std::slice::from_ref(&packet));

    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::new();
    for (i, byte) in wire.iter().enumerate() {
        buf.extend_from_slice(&[*byte]);
        let decoded = codec.decode(&mut buf).unwrap();
        if i + 1 < wire.len() {
            assert!(decoded.is_none(), "emitted after {} of {} bytes", i + 1, wire.len());
            assert_eq!(buf.len(), i + 1, "partial frame must stay buffered");
        } else {
            assert_eq!(decoded, Some(packet.clone()));
        }
    }
}

#[test]
fn test_chunking_does_not_change_result() {
    let packets = sample_stream();
    let wire = encode_all(&packets);

    let whole = decode_in_chunks(&wire, wire.len());
    assert_eq!(whole, packets);

    for chunk in [1, 2, 3, 5, 7, 64] {
        assert_eq!(decode_in_chunks(&wire, chunk), whole, "chunk size {chunk}");
    }
}

#[test]
fn test_unknown_type_id_is_isolated() {
    let before = Packet::query_status(&b"AAAA0000"[..]);
    let after = Packet::NewCodeResponse {
        code: Bytes::from_static(b"BBBB1111"),
    };

    let mut buf = encode_all(std::slice::from_ref(&before));
    // Type id 42 with a three byte payload.
    buf.extend_from_slice(&[0x00, 0x2A, 0x00, 0x03, 0xDE, 0xAD, 0xBE]);
    let bad_frame_len = HEADER_LEN + 3;
    buf.extend_from_slice(&encode_all(std::slice::from_ref(&after)));

    let mut codec = PacketCodec::new();
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(before));

    let len_before_error = buf.len();
    let err = codec.decode(&mut buf).unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownPacketType(42)));
    assert_eq!(buf.len(), len_before_error, "failed decode consumed bytes");

    // Repeated attempts fail the same way.
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ProtocolError::UnknownPacketType(42))
    ));

    // Once the bad frame is skipped the next one decodes intact.
    buf.advance(bad_frame_len);
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(after));
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn test_unknown_type_id_waits_for_full_frame() {
    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::from(&[0x00, 0x2A, 0x00, 0x04, 0x01][..]);
    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert_eq!(buf.len(), 5);
}

#[test]
fn test_malformed_payload_is_reported() {
    // NewCodeComplete claiming a 16 byte ticket inside a 4 byte payload.
    let mut buf = BytesMut::from(&[0x00, 0x03, 0x00, 0x04, 0x00, 0x10, b'a', b'b'][..]);
    let err = PacketCodec::new().decode(&mut buf).unwrap_err();
    assert!(err.is_framing());
    assert!(matches!(err, ProtocolError::MalformedPayload { .. }));
}

#[test]
fn test_decoded_fields_share_frame_buffer() {
    let wire = encode_all(&[Packet::NewCodeResponse {
        code: Bytes::from_static(b"99999999"),
    }]);
    let mut buf = BytesMut::from(&wire[..]);
    let decoded = PacketCodec::new().decode(&mut buf).unwrap().unwrap();

    let Packet::NewCodeResponse { code } = decoded else {
        panic!("wrong variant");
    };
    assert_eq!(&code[..], b"99999999");
    assert!(buf.is_empty());
}

#[test]
fn test_edge_case_payloads_roundtrip() {
    let big = Bytes::from(vec![b'x'; 60_000]);
    let packets = vec![
        Packet::NewCodeResponse { code: Bytes::new() },
        Packet::complete(Bytes::new(), Bytes::new()),
        Packet::complete(&b"c"[..], big.clone()),
        Packet::QueryStatusResponse {
            code: Bytes::new(),
            ticket: Some(Bytes::new()),
        },
        Packet::code_info_update(Bytes::new(), u16::MAX, None),
        Packet::CodeInfoResponse {
            code: Bytes::from_static(b"c"),
            captcha_type: 1,
            captcha_data: Some(big),
        },
    ];
    let wire = encode_all(&packets);
    assert_eq!(decode_in_chunks(&wire, 1024), packets);
}
