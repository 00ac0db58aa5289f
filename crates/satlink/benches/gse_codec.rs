// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSE encode/decode throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use satlink::config::{DecapConfig, EncapConfig};
use satlink::gse::{get_chunk, GseDecoder, GseEncoder};
use satlink::net::{Burst, Packet, Protocol};

fn payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_encap_complete(c: &mut Criterion) {
    let data = payload(1400);
    c.bench_function("encap_1400B_complete", |b| {
        let mut encoder = GseEncoder::new(&EncapConfig::default());
        b.iter(|| {
            let upper = Packet::build(Protocol::Ipv4, &data, 0, 1, 2).unwrap();
            let (gse, _) = encoder.encapsulate(std::iter::once(upper).collect()).unwrap();
            black_box(gse)
        });
    });
}

fn bench_roundtrip_fragmented(c: &mut Criterion) {
    let data = payload(12_000);
    c.bench_function("roundtrip_12kB_fragmented", |b| {
        let mut encoder = GseEncoder::new(&EncapConfig::default());
        let mut decoder = GseDecoder::new(&DecapConfig::default(), 2);
        b.iter(|| {
            let upper = Packet::build(Protocol::Ipv6, &data, 0, 1, 2).unwrap();
            let (gse, _) = encoder.encapsulate(std::iter::once(upper).collect()).unwrap();
            let upper = decoder.decapsulate(gse).unwrap();
            black_box(upper)
        });
    });
}

fn bench_packing(c: &mut Criterion) {
    c.bench_function("pack_21_mpeg_cells", |b| {
        let mut encoder = GseEncoder::new(&EncapConfig::default());
        b.iter(|| {
            let burst: Burst = (0..21u8)
                .map(|i| Packet::build(Protocol::Mpeg, &[i; 188], 3, 1, 2).unwrap())
                .collect();
            let (gse, _) = encoder.encapsulate(burst).unwrap();
            black_box(gse)
        });
    });
}

fn bench_chunking(c: &mut Criterion) {
    let data = payload(3000);
    c.bench_function("chunk_3kB_into_500B_frames", |b| {
        let mut encoder = GseEncoder::new(&EncapConfig::default());
        b.iter(|| {
            let upper = Packet::build(Protocol::Ipv4, &data, 0, 1, 2).unwrap();
            let (gse, _) = encoder.encapsulate(std::iter::once(upper).collect()).unwrap();
            let mut pieces = 0usize;
            for packet in gse {
                let mut pending = Some(packet);
                while let Some(packet) = pending.take() {
                    let chunk = get_chunk(packet, 500).unwrap();
                    if chunk.data.is_some() {
                        pieces += 1;
                    }
                    pending = chunk.remaining;
                }
            }
            black_box(pieces)
        });
    });
}

criterion_group!(
    benches,
    bench_encap_complete,
    bench_roundtrip_fragmented,
    bench_packing,
    bench_chunking
);
criterion_main!(benches);
