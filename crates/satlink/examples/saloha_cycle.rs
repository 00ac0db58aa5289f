// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! A full random-access cycle: two terminals transmit over a shared
//! channel, the gateway resolves contention, acknowledges and reassembles,
//! the terminals retire their ACKed packets.
//!
//! ```sh
//! cargo run --example saloha_cycle
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use satlink::config::{CollisionAlgorithm, DecapConfig, EncapConfig, SalohaConfig};
use satlink::fmt::{FmtGroup, FmtTable, UnitConverter};
use satlink::gse::{GseDecoder, GseEncoder};
use satlink::net::{Packet, Protocol};
use satlink::saloha::{SalohaController, SalohaTalConfig, SalohaTerminal};
use satlink::terminal::{CarrierGroup, TerminalCatalog, TerminalCategory};

fn main() {
    env_logger::init();

    // one category, two carriers, QPSK 1/2: 200 slots per frame
    let mut category = TerminalCategory::new("Standard");
    category.add_carrier_group(CarrierGroup::new(1, FmtGroup::new(vec![3]), 100, 1e6, 2));
    let catalog =
        TerminalCatalog::new(vec![category], BTreeMap::new(), Some("Standard".to_string()));
    let mut converter = UnitConverter::new(Duration::from_millis(50), 1000);
    let mut gateway = SalohaController::new(
        SalohaConfig { algorithm: CollisionAlgorithm::Crdsa, ..SalohaConfig::default() },
        catalog,
        1,
        1,
        &mut converter,
        &FmtTable::with_defaults(),
    )
    .unwrap();

    let mut terminals: Vec<SalohaTerminal> = [5u8, 9]
        .iter()
        .map(|&tal_id| {
            gateway.add_terminal(tal_id).unwrap();
            let mut terminal =
                SalohaTerminal::new(tal_id, SalohaTalConfig::default(), 100, 2);
            terminal.seed_rng(u64::from(tal_id));
            terminal
        })
        .collect();

    // each terminal encapsulates one IP packet and queues it as a PDU
    for terminal in &mut terminals {
        let mut encoder = GseEncoder::new(&EncapConfig::default());
        let upper =
            Packet::build(Protocol::Ipv4, &vec![terminal.tal_id(); 200], 0, terminal.tal_id(), 1)
                .unwrap();
        let (gse, _) = encoder.encapsulate(std::iter::once(upper).collect()).unwrap();
        terminal.enqueue(gse);
    }

    // superframe: terminals transmit, the gateway receives and schedules
    for terminal in &mut terminals {
        for frame in terminal.schedule().unwrap() {
            gateway.on_rcv_frame(&frame).unwrap();
        }
    }
    let output = gateway.schedule(0).unwrap();
    let stats = gateway.stats("Standard");
    println!(
        "gateway: {} GSE packets recovered, {} collisions (before: {})",
        output.burst.len(),
        stats.collisions,
        stats.collisions_before
    );

    // ACKs travel back to the terminals
    for frame in &output.control_frames {
        for terminal in &mut terminals {
            terminal.on_rcv_frame(frame).unwrap();
        }
    }
    for terminal in &terminals {
        println!(
            "terminal {}: {} unacknowledged packet(s)",
            terminal.tal_id(),
            terminal.unacked_packets()
        );
    }

    // the recovered GSE packets decode back to the upper traffic
    let mut decoder = GseDecoder::new(&DecapConfig::default(), 1);
    let upper = decoder.decapsulate(output.burst).unwrap();
    for packet in upper.iter() {
        println!(
            "gateway upper: {} bytes from terminal {}",
            packet.total_length(),
            packet.src_tal_id()
        );
    }
}
