use bytes::{Bytes, BytesMut};
use captcha_relay::core::codec::PacketCodec;
use captcha_relay::core::packet::Packet;
use captcha_relay::session::registry::SessionRegistry;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use std::time::Duration;
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_packet_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode_decode");
    let data_sizes = [0usize, 64, 512, 4096, 32 * 1024];

    for &size in &data_sizes {
        let packet = Packet::code_info_update(
            &b"12345678"[..],
            1,
            (size > 0).then(|| Bytes::from(vec![b'x'; size])),
        );
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("encode_{size}b"), |b| {
            let mut codec = PacketCodec::new();
            let mut buf = BytesMut::with_capacity(size + 32);
            b.iter(|| {
                buf.clear();
                codec.encode(&packet, &mut buf).unwrap();
            })
        });

        let mut frame = BytesMut::new();
        PacketCodec::new().encode(&packet, &mut frame).unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            let mut codec = PacketCodec::new();
            b.iter_batched(
                || frame.clone(),
                |mut buf| {
                    let decoded = codec.decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_stream_of_small_frames(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_stream");
    let mut stream = BytesMut::new();
    let mut codec = PacketCodec::new();
    for i in 0..1000u32 {
        let code = Bytes::from(format!("{i:08}"));
        codec.encode(Packet::query_status(code), &mut stream).unwrap();
    }
    group.throughput(Throughput::Elements(1000));

    group.bench_function("decode_1000_queries", |b| {
        b.iter_batched(
            || stream.clone(),
            |mut buf| {
                let mut codec = PacketCodec::new();
                let mut count = 0;
                while let Some(_packet) = codec.decode(&mut buf).unwrap() {
                    count += 1;
                }
                assert_eq!(count, 1000);
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

fn bench_registry_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("session_registry");

    group.bench_function("allocate_complete_query", |b| {
        let registry = SessionRegistry::new(Duration::from_secs(60));
        let ticket = Bytes::from_static(b"ticket");
        b.iter(|| {
            let code = registry.allocate();
            registry.complete(code.clone(), ticket.clone());
            registry.query_status(&code)
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_packet_encode_decode,
    bench_stream_of_small_frames,
    bench_registry_allocate
);
criterion_main!(benches);
