// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Multi-packet packing of fixed-length uppers.
//!
//! MPEG cells sharing `(src, dst, qos)` accumulate into one GSE PDU; a
//! zero packing threshold emits immediately, a non-zero one defers until
//! the upper layer flushes the context.

use std::time::Duration;

use satlink::config::{DecapConfig, EncapConfig};
use satlink::gse::header::{parse_packet, PacketVariant};
use satlink::gse::{GseDecoder, GseEncoder};
use satlink::net::{Burst, Packet, Protocol};

fn mpeg_cell(src: u8, dst: u8, qos: u8, fill: u8) -> Packet {
    Packet::build(Protocol::Mpeg, &[fill; 188], qos, src, dst).unwrap()
}

#[test]
fn threshold_zero_packs_three_cells_into_one_packet() {
    let mut encoder = GseEncoder::new(&EncapConfig::default());
    let burst: Burst = (0..3).map(|i| mpeg_cell(1, 2, 3, i)).collect();
    let (gse, intents) = encoder.encapsulate(burst).unwrap();

    assert!(intents.is_empty());
    assert_eq!(gse.len(), 1);
    let packet = gse.front().unwrap();
    // three cells behind one complete header (mandatory + protocol + label)
    assert_eq!(packet.total_length(), 3 * 188 + 10);
    match parse_packet(packet.data()).unwrap().0 {
        PacketVariant::Complete { label, protocol_type, payload } => {
            assert_eq!(label.bytes(), &[1, 2, 3, 0, 0, 0]);
            assert_eq!(protocol_type, Protocol::Mpeg.id());
            assert_eq!(payload.len(), 3 * 188);
        }
        other => panic!("expected a complete packet, got {:?}", other),
    }
}

#[test]
fn threshold_defers_until_flush_of_the_context_id() {
    let config = EncapConfig {
        packing_threshold: Duration::from_millis(50),
        ..EncapConfig::default()
    };
    let mut encoder = GseEncoder::new(&config);

    // first cell: deferred
    let (gse, intents) = encoder
        .encapsulate(std::iter::once(mpeg_cell(1, 2, 3, 0)).collect())
        .unwrap();
    assert!(gse.is_empty());
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0].delay, Duration::from_millis(50));
    assert_eq!(intents[0].context_id, (1 << 8) | (2 << 3) | 3);
    assert_eq!(intents[0].context_id, 0x113);

    // second cell: still deferred
    let (gse, intents) = encoder
        .encapsulate(std::iter::once(mpeg_cell(1, 2, 3, 1)).collect())
        .unwrap();
    assert!(gse.is_empty());
    assert_eq!(intents.len(), 1);

    // only the flush emits the packed packet
    let gse = encoder.flush(0x113).unwrap();
    assert_eq!(gse.len(), 1);
    assert_eq!(gse.front().unwrap().total_length(), 2 * 188 + 10);
}

#[test]
fn packing_preserves_cell_boundaries_and_order() {
    let mut encoder = GseEncoder::new(&EncapConfig::default());
    let cells: Vec<Packet> = (0..5).map(|i| mpeg_cell(4, 6, 1, i)).collect();
    let (gse, _) = encoder.encapsulate(cells.into_iter().collect()).unwrap();

    let mut decoder = GseDecoder::new(&DecapConfig::default(), 6);
    let upper = decoder.decapsulate(gse).unwrap();
    assert_eq!(upper.len(), 5);
    for (i, packet) in upper.iter().enumerate() {
        assert_eq!(packet.protocol(), Protocol::Mpeg);
        assert_eq!(packet.total_length(), 188);
        assert_eq!(packet.data(), &[i as u8; 188]);
        assert_eq!(packet.qos(), 1);
    }
}

#[test]
fn buffer_full_emits_without_waiting_for_the_timer() {
    let config = EncapConfig {
        packing_threshold: Duration::from_millis(1000),
        ..EncapConfig::default()
    };
    let mut encoder = GseEncoder::new(&config);
    // 21 cells of 188 bytes fill past 4097 - 188, forcing an emission
    let cells: Vec<Packet> = (0..30).map(|i| mpeg_cell(1, 2, 0, i)).collect();
    let (gse, intents) = encoder.encapsulate(cells.into_iter().collect()).unwrap();
    assert!(!gse.is_empty(), "a full buffer cannot keep deferring");
    assert!(!intents.is_empty(), "the refilled context defers again");
}

#[test]
fn distinct_identifiers_never_pack_together() {
    let mut encoder = GseEncoder::new(&EncapConfig::default());
    let mut burst = Burst::new();
    burst.add(mpeg_cell(1, 2, 3, 0));
    burst.add(mpeg_cell(2, 2, 3, 1)); // different source
    burst.add(mpeg_cell(1, 3, 3, 2)); // different destination
    burst.add(mpeg_cell(1, 2, 4, 3)); // different qos
    let (gse, _) = encoder.encapsulate(burst).unwrap();
    assert_eq!(gse.len(), 4);
}

#[test]
fn atm_cells_pack_too() {
    let mut encoder = GseEncoder::new(&EncapConfig::default());
    let cells: Vec<Packet> = (0..3)
        .map(|i| Packet::build(Protocol::Atm, &[i; 53], 0, 1, 2).unwrap())
        .collect();
    let (gse, _) = encoder.encapsulate(cells.into_iter().collect()).unwrap();
    assert_eq!(gse.len(), 1);
    assert_eq!(gse.front().unwrap().total_length(), 3 * 53 + 10);
}
