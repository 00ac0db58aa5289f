// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! ACK / retransmission behaviour across the random-access channel.

use std::collections::BTreeMap;
use std::time::Duration;

use satlink::config::{CollisionAlgorithm, EncapConfig, SalohaConfig};
use satlink::fmt::{FmtGroup, FmtTable, UnitConverter};
use satlink::gse::GseEncoder;
use satlink::net::{Packet, Protocol};
use satlink::saloha::{
    SaDataPacket, SaFrame, SaFrameKind, SalohaController, SalohaTalConfig, SalohaTerminal,
};
use satlink::terminal::{CarrierGroup, TerminalCatalog, TerminalCategory};

fn make_gateway() -> SalohaController {
    let mut category = TerminalCategory::new("Standard");
    category.add_carrier_group(CarrierGroup::new(1, FmtGroup::new(vec![3]), 100, 1e6, 2));
    let catalog =
        TerminalCatalog::new(vec![category], BTreeMap::new(), Some("Standard".to_string()));
    let mut converter = UnitConverter::new(Duration::from_millis(50), 1000);
    let mut gateway = SalohaController::new(
        SalohaConfig { algorithm: CollisionAlgorithm::Dsa, ..SalohaConfig::default() },
        catalog,
        1,
        1,
        &mut converter,
        &FmtTable::with_defaults(),
    )
    .unwrap();
    gateway.seed_rng(77);
    gateway
}

fn make_terminal(tal_id: u8) -> SalohaTerminal {
    let config = SalohaTalConfig { nb_replicas: 2, timeout_saf: 2, max_retransmissions: 3 };
    let mut terminal = SalohaTerminal::new(tal_id, config, 100, 2);
    terminal.seed_rng(u64::from(tal_id) * 13);
    terminal
}

fn enqueue_one_pdu(terminal: &mut SalohaTerminal, payload_len: usize) {
    let mut encoder = GseEncoder::new(&EncapConfig::default());
    let upper = Packet::build(
        Protocol::Ipv4,
        &vec![terminal.tal_id(); payload_len],
        0,
        terminal.tal_id(),
        1,
    )
    .unwrap();
    let (gse, _) = encoder.encapsulate(std::iter::once(upper).collect()).unwrap();
    terminal.enqueue(gse);
}

#[test]
fn lost_data_frames_are_retransmitted_until_delivered() {
    let mut gateway = make_gateway();
    gateway.add_terminal(5).unwrap();
    let mut terminal = make_terminal(5);
    enqueue_one_pdu(&mut terminal, 120);

    // first transmission is lost on the way up
    let lost = terminal.schedule().unwrap();
    assert!(!lost.is_empty());
    assert_eq!(terminal.unacked_packets(), 1);

    // the terminal retransmits after its timeout
    let mut superframe = 0;
    let mut delivered = false;
    for _ in 0..6 {
        let frames = terminal.schedule().unwrap();
        for frame in &frames {
            gateway.on_rcv_frame(frame).unwrap();
            delivered = true;
        }
        let output = gateway.schedule(superframe).unwrap();
        superframe += 1;
        if delivered {
            assert_eq!(output.burst.len(), 1, "the retransmission must get through");
            for frame in &output.control_frames {
                terminal.on_rcv_frame(frame).unwrap();
            }
            break;
        }
    }
    assert!(delivered);
    assert_eq!(terminal.unacked_packets(), 0, "the ACK must clear the packet");

    // and nothing further goes on the air
    assert!(terminal.schedule().unwrap().is_empty());
}

/// A data packet whose payload is a complete GSE packet from `src`.
fn sa_packet(pdu_id: u32, ts: u16, seq: u16, pdu_nb: u16, src: u8) -> SaDataPacket {
    let gse_bytes = satlink::gse::header::write_complete(
        Protocol::Ipv4.id(),
        satlink::gse::Label::six(src, 1, 0).unwrap(),
        &[src; 30],
    );
    let mut packet = SaDataPacket::new(&gse_bytes, pdu_id, ts, seq, pdu_nb, 1, 0);
    packet.set_src_tal_id(src);
    packet
}

fn frame_with(packets: &[SaDataPacket]) -> SaFrame {
    let mut frame = SaFrame::new(SaFrameKind::Data);
    for packet in packets {
        assert!(frame.add_data_packet(packet));
    }
    frame
}

#[test]
fn replayed_member_after_a_lost_ack_is_not_counted_twice() {
    let mut gateway = make_gateway();
    gateway.add_terminal(5).unwrap();

    // tick 0: first member of a two-member PDU arrives and is ACKed, but
    // the ACK never reaches the terminal
    gateway.on_rcv_frame(&frame_with(&[sa_packet(9, 3, 0, 2, 5)])).unwrap();
    let output = gateway.schedule(0).unwrap();
    assert!(output.burst.is_empty());
    assert_eq!(output.control_frames.len(), 1);

    // tick 1: the terminal replays the same member
    gateway.on_rcv_frame(&frame_with(&[sa_packet(9, 7, 0, 2, 5)])).unwrap();
    let output = gateway.schedule(1).unwrap();
    // it is ACKed again, but must not complete the PDU by itself
    assert!(output.burst.is_empty(), "a duplicate member must not complete the PDU");
    assert_eq!(output.control_frames.len(), 1);

    // tick 2: the genuine second member completes the PDU with two members
    gateway.on_rcv_frame(&frame_with(&[sa_packet(9, 11, 1, 2, 5)])).unwrap();
    let output = gateway.schedule(2).unwrap();
    assert_eq!(output.burst.len(), 2);
}

#[test]
fn exhausted_retransmissions_drop_the_pdu() {
    let mut terminal = make_terminal(6);
    enqueue_one_pdu(&mut terminal, 80);

    let mut transmissions = 0;
    for _ in 0..30 {
        let frames = terminal.schedule().unwrap();
        if !frames.is_empty() {
            transmissions += 1;
        }
        // every frame is lost
    }
    // initial + max_retransmissions, then silence
    assert_eq!(transmissions, 4);
    assert_eq!(terminal.unacked_packets(), 0);
    assert_eq!(terminal.pending_packets(), 0);
}
