#![no_main]

use bytes::BytesMut;
use captcha_relay::core::codec::PacketCodec;
use libfuzzer_sys::fuzz_target;
use tokio_util::codec::{Decoder, Encoder};

fuzz_target!(|data: &[u8]| {
    // Decode until the buffer runs dry or errors; anything decoded must re-encode.
    let mut codec = PacketCodec::new();
    let mut buf = BytesMut::from(data);
    while let Ok(Some(packet)) = codec.decode(&mut buf) {
        let mut out = BytesMut::new();
        if codec.encode(&packet, &mut out).is_err() {
            panic!("decoded packet failed to re-encode: {packet:?}");
        }
    }
});
