//! Property-based tests using proptest
//!
//! These tests validate codec invariants across randomly generated packets
//! and randomly segmented byte streams.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::{Bytes, BytesMut};
use captcha_relay::core::codec::PacketCodec;
use captcha_relay::core::packet::Packet;
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

fn field(max: usize) -> impl Strategy<Value = Bytes> {
    prop::collection::vec(any::<u8>(), 0..max).prop_map(Bytes::from)
}

/// `Some(empty)` captcha data reads back as `None`, so never generate it.
fn captcha_data() -> impl Strategy<Value = Option<Bytes>> {
    prop::option::of(prop::collection::vec(any::<u8>(), 1..512).prop_map(Bytes::from))
}

fn any_packet() -> impl Strategy<Value = Packet> {
    prop_oneof![
        Just(Packet::KeepAlive),
        Just(Packet::NewCodeRequest),
        field(64).prop_map(|code| Packet::NewCodeResponse { code }),
        (field(64), field(2048)).prop_map(|(code, ticket)| Packet::NewCodeComplete { code, ticket }),
        field(64).prop_map(|code| Packet::QueryStatusRequest { code }),
        (field(64), prop::option::of(field(2048)))
            .prop_map(|(code, ticket)| Packet::QueryStatusResponse { code, ticket }),
        (field(64), any::<u16>(), captcha_data()).prop_map(|(code, captcha_type, captcha_data)| {
            Packet::CodeInfoUpdate {
                code,
                captcha_type,
                captcha_data,
            }
        }),
        field(64).prop_map(|code| Packet::CodeInfoRefresh { code }),
        field(64).prop_map(|code| Packet::CodeInfoQuery { code }),
        (field(64), any::<u16>(), captcha_data()).prop_map(|(code, captcha_type, captcha_data)| {
            Packet::CodeInfoResponse {
                code,
                captcha_type,
                captcha_data,
            }
        }),
    ]
}

// Property: every packet survives an encode/decode cycle unchanged
proptest! {
    #[test]
    fn prop_packet_roundtrip(packet in any_packet()) {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(&packet, &mut buf).expect("encode should not fail");

        let decoded = codec.decode(&mut buf).expect("decode should not fail");
        prop_assert_eq!(decoded, Some(packet));
        prop_assert!(buf.is_empty());
    }
}

// Property: segmentation of the byte stream never changes the decoded sequence
proptest! {
    #[test]
    fn prop_split_points_are_invisible(
        packets in prop::collection::vec(any_packet(), 1..16),
        cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..32),
    ) {
        let mut codec = PacketCodec::new();
        let mut wire = BytesMut::new();
        for packet in &packets {
            codec.encode(packet, &mut wire).unwrap();
        }
        let wire = wire.freeze();

        let mut points: Vec<usize> = cuts.iter().map(|i| i.index(wire.len() + 1)).collect();
        points.push(0);
        points.push(wire.len());
        points.sort_unstable();
        points.dedup();

        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for window in points.windows(2) {
            buf.extend_from_slice(&wire[window[0]..window[1]]);
            while let Some(packet) = codec.decode(&mut buf).unwrap() {
                decoded.push(packet);
            }
        }

        prop_assert_eq!(decoded, packets);
        prop_assert!(buf.is_empty());
    }
}

// Property: garbage input either decodes, waits, or errors; it never panics
proptest! {
    #[test]
    fn prop_decoder_total_on_garbage(data in prop::collection::vec(any::<u8>(), 0..4096)) {
        let mut codec = PacketCodec::new();
        let mut buf = BytesMut::from(&data[..]);
        while let Ok(Some(_)) = codec.decode(&mut buf) {}
    }
}

// Property: encoding is deterministic
proptest! {
    #[test]
    fn prop_encoding_deterministic(packet in any_packet()) {
        let mut a = BytesMut::new();
        let mut b = BytesMut::new();
        PacketCodec::new().encode(&packet, &mut a).unwrap();
        PacketCodec::new().encode(packet, &mut b).unwrap();
        prop_assert_eq!(a, b);
    }
}
