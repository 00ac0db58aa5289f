// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmit-side GSE pipeline: encapsulate a burst, pull scheduler-sized
//! chunks through the chunking port, decode everything on the far side.
//!
//! ```sh
//! cargo run --example gse_pipeline
//! ```

use satlink::config::{DecapConfig, EncapConfig};
use satlink::gse::{get_chunk, GseDecoder, GseEncoder};
use satlink::net::{Burst, Packet, Protocol};

fn main() {
    env_logger::init();

    // three IP packets for terminal 2, one of them large enough to fragment
    let mut upper = Burst::new();
    upper.add(Packet::build(Protocol::Ipv4, &vec![0x11; 400], 0, 1, 2).unwrap());
    upper.add(Packet::build(Protocol::Ipv4, &vec![0x22; 9000], 1, 1, 2).unwrap());
    upper.add(Packet::build(Protocol::Ipv4, &vec![0x33; 60], 2, 1, 2).unwrap());
    println!("upper burst: {} packets, {} bytes", upper.len(), upper.bytes_length());

    let mut encoder = GseEncoder::new(&EncapConfig::default());
    let (gse, _) = encoder.encapsulate(upper).unwrap();
    println!("encapsulated: {} GSE packets", gse.len());

    // the frame scheduler pulls 800-byte chunks
    let mut decoder = GseDecoder::new(&DecapConfig::default(), 2);
    let mut recovered = Burst::new();
    let mut frames = 0;
    for packet in gse {
        let mut pending = Some(packet);
        while let Some(packet) = pending.take() {
            let chunk = get_chunk(packet, 800).unwrap();
            if let Some(head) = chunk.data {
                frames += 1;
                recovered.extend(decoder.decapsulate(std::iter::once(head).collect()).unwrap());
            }
            pending = chunk.remaining;
        }
    }
    println!("scheduled {} frame payloads", frames);

    for packet in recovered.iter() {
        println!(
            "recovered {} packet: {} bytes, qos {}, {} -> {}",
            packet.protocol(),
            packet.total_length(),
            packet.qos(),
            packet.src_tal_id(),
            packet.dst_tal_id()
        );
    }
    assert_eq!(recovered.len(), 3);
}
