// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSE decoder: burst-level de-encapsulation.
//!
//! Filters out packets addressed elsewhere, reassembles PDUs through the
//! engine, dispatches by the recovered protocol type and slices packed
//! fixed-length cells back into individual packets.

use crate::config::DecapConfig;
use crate::gse::decap::{DecapMetadata, DecapStatus, Decapsulator};
use crate::gse::ext::{decode_cni, EXTENSION_CNI};
use crate::gse::header::packet_addressing;
use crate::net::{Burst, Container, Packet, Protocol};
use crate::{Result, SpotId, TalId, BROADCAST_TAL_ID};

/// Stateful GSE decoder (receive side).
#[derive(Debug)]
pub struct GseDecoder {
    decap: Decapsulator,
    /// This node's terminal id; packets for other destinations are dropped.
    dst_tal_id: TalId,
}

impl GseDecoder {
    pub fn new(config: &DecapConfig, dst_tal_id: TalId) -> Self {
        Self {
            decap: Decapsulator::new(config.max_frag_id, config.max_pdu_size),
            dst_tal_id,
        }
    }

    /// Change the filter terminal id (used when the node learns its id late).
    pub fn set_filter_tal_id(&mut self, dst_tal_id: TalId) {
        self.dst_tal_id = dst_tal_id;
    }

    fn keeps(&self, dst_tal_id: TalId) -> bool {
        dst_tal_id == self.dst_tal_id || dst_tal_id == BROADCAST_TAL_ID
    }

    /// De-encapsulate a burst of GSE packets into upper-layer packets.
    pub fn decapsulate(&mut self, burst: Burst) -> Result<Burst> {
        let mut upper = Burst::new();
        for packet in burst {
            if !self.keeps(packet.dst_tal_id()) {
                log::info!("GSE packet is for terminal {}, drop it", packet.dst_tal_id());
                continue;
            }
            self.decap_one(packet.data(), packet.dst_spot(), &mut upper);
        }
        Ok(upper)
    }

    /// De-encapsulate a raw container of concatenated GSE packets.
    ///
    /// `max_packets` bounds the walk (0 = until padding or end of region).
    pub fn decapsulate_container(
        &mut self,
        container: &Container,
        max_packets: usize,
        dst_spot: SpotId,
    ) -> Result<Burst> {
        let mut upper = Burst::new();
        let mut offset = 0;
        let mut seen = 0usize;
        while offset < container.len() && (max_packets == 0 || seen < max_packets) {
            let data = container.payload(offset)?;
            // Filter what can be filtered before reassembly: complete and
            // first-fragment packets carry their destination; subsequent
            // fragments do not and must reach the engine.
            if let Ok((_, dst, _)) = packet_addressing(data) {
                if dst != BROADCAST_TAL_ID && !self.keeps(dst) {
                    let length = super::header::packet_length(data)?;
                    log::info!("GSE packet is for terminal {}, drop it", dst);
                    offset += length;
                    seen += 1;
                    continue;
                }
            }
            let Some(consumed) = self.decap_one(data, dst_spot, &mut upper) else {
                break;
            };
            offset += consumed;
            seen += 1;
        }
        Ok(upper)
    }

    /// Feed one packet to the engine. Returns consumed bytes, or `None` on
    /// padding (nothing further follows in this container).
    fn decap_one(&mut self, data: &[u8], dst_spot: SpotId, upper: &mut Burst) -> Option<usize> {
        match self.decap.decap(data) {
            Ok((DecapStatus::Completed { pdu, metadata }, consumed)) => {
                self.dispatch(pdu, &metadata, dst_spot, upper);
                Some(consumed)
            }
            Ok((DecapStatus::FragmentStored, consumed)) => Some(consumed),
            Ok((DecapStatus::ContextOverwritten, consumed)) => {
                log::warn!("a partially reassembled PDU was evicted for a new fragment");
                Some(consumed)
            }
            Ok((DecapStatus::ContextNotInit, consumed)) => {
                // first fragment lost or addressed to another receiver
                log::debug!("subsequent fragment without a context, drop it");
                Some(consumed)
            }
            Ok((DecapStatus::Padding, _)) => None,
            Err(err) => {
                log::error!("GSE de-encapsulation failed ({}), drop packet", err);
                // advance past the broken packet when its length is readable
                super::header::packet_length(data).ok()
            }
        }
    }

    fn dispatch(
        &self,
        pdu: Vec<u8>,
        metadata: &DecapMetadata,
        dst_spot: SpotId,
        upper: &mut Burst,
    ) {
        let Some((src, dst, qos)) = metadata.label.addressing() else {
            log::error!("completed PDU without addressing, drop it");
            return;
        };
        if !self.keeps(dst) {
            log::info!("reassembled PDU is for terminal {}, drop it", dst);
            return;
        }
        let Some(protocol) = Protocol::from_id(metadata.protocol_type) else {
            log::error!(
                "unknown upper protocol type 0x{:04x}, drop PDU",
                metadata.protocol_type
            );
            return;
        };

        if let Some(cell_length) = protocol.fixed_length() {
            if pdu.is_empty() || pdu.len() % cell_length != 0 {
                log::error!(
                    "payload of {} bytes is not a whole number of {}-byte {} cells, drop PDU",
                    pdu.len(),
                    cell_length,
                    protocol
                );
                return;
            }
            for cell in pdu.chunks(cell_length) {
                match Packet::build(protocol, cell, qos, src, dst) {
                    Ok(mut packet) => {
                        packet.set_dst_spot(dst_spot);
                        upper.add(packet);
                    }
                    Err(err) => log::error!("cannot rebuild a {} cell: {}", protocol, err),
                }
            }
        } else {
            match Packet::build(protocol, &pdu, qos, src, dst) {
                Ok(mut packet) => {
                    packet.set_dst_spot(dst_spot);
                    for ext in &metadata.extensions {
                        if let Err(err) = packet.add_header_extension(ext.id, ext.data.clone()) {
                            log::error!("cannot attach extension 0x{:04x}: {}", ext.id, err);
                        }
                    }
                    upper.add(packet);
                }
                Err(err) => log::error!("cannot rebuild a {} packet: {}", protocol, err),
            }
        }
    }

    /// Read back the CNI header extension delivered with a packet.
    pub fn cni_extension(packet: &Packet) -> Result<u32> {
        let data = packet.header_extension(EXTENSION_CNI)?;
        decode_cni(&crate::gse::ext::HeaderExtension {
            id: EXTENSION_CNI,
            data: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncapConfig;
    use crate::gse::encoder::GseEncoder;

    fn encode(packets: Vec<Packet>) -> Burst {
        let mut enc = GseEncoder::new(&EncapConfig::default());
        let (gse, _) = enc.encapsulate(packets.into_iter().collect()).unwrap();
        gse
    }

    #[test]
    fn filter_drops_other_destinations() {
        let gse = encode(vec![
            Packet::build(Protocol::Ipv4, &[0u8; 40], 0, 1, 2).unwrap(),
            Packet::build(Protocol::Ipv4, &[0u8; 40], 0, 1, 9).unwrap(),
        ]);
        let mut dec = GseDecoder::new(&DecapConfig::default(), 2);
        let upper = dec.decapsulate(gse).unwrap();
        assert_eq!(upper.len(), 1);
        assert_eq!(upper.front().unwrap().dst_tal_id(), 2);
    }

    #[test]
    fn broadcast_reaches_every_receiver() {
        for receiver in [0, 5, 30] {
            let gse = encode(vec![
                Packet::build(Protocol::Ipv4, &[7u8; 40], 0, 1, BROADCAST_TAL_ID).unwrap(),
            ]);
            let mut dec = GseDecoder::new(&DecapConfig::default(), receiver);
            assert_eq!(dec.decapsulate(gse).unwrap().len(), 1);
        }
    }

    #[test]
    fn packing_preserves_cell_boundaries_in_order() {
        let cells: Vec<Packet> = (0..4u8)
            .map(|i| Packet::build(Protocol::Mpeg, &[i; 188], 3, 1, 2).unwrap())
            .collect();
        let gse = encode(cells);
        let mut dec = GseDecoder::new(&DecapConfig::default(), 2);
        let upper = dec.decapsulate(gse).unwrap();
        assert_eq!(upper.len(), 4);
        for (i, packet) in upper.iter().enumerate() {
            assert_eq!(packet.protocol(), Protocol::Mpeg);
            assert_eq!(packet.data(), &[i as u8; 188]);
        }
    }

    #[test]
    fn ragged_fixed_length_pdu_dropped_whole() {
        // hand-build a complete GSE packet whose MPEG payload is not a
        // multiple of 188
        let label = crate::gse::Label::six(1, 2, 0).unwrap();
        let bytes = crate::gse::header::write_complete(Protocol::Mpeg.id(), label, &[0u8; 200]);
        let packet = crate::gse::header::build_packet(&bytes).unwrap();
        let mut dec = GseDecoder::new(&DecapConfig::default(), 2);
        let upper = dec.decapsulate(std::iter::once(packet).collect()).unwrap();
        assert!(upper.is_empty());
    }

    #[test]
    fn container_walk_stops_at_padding() {
        let gse = encode(vec![Packet::build(Protocol::Ipv4, &[1u8; 30], 0, 1, 2).unwrap()]);
        let mut raw = Vec::new();
        for packet in gse.iter() {
            raw.extend_from_slice(packet.data());
        }
        raw.extend_from_slice(&[0u8; 16]); // trailing padding
        let container = Container::new(raw);
        let mut dec = GseDecoder::new(&DecapConfig::default(), 2);
        let upper = dec.decapsulate_container(&container, 0, 0).unwrap();
        assert_eq!(upper.len(), 1);
    }

    #[test]
    fn attributes_survive_the_roundtrip() {
        let gse = encode(vec![Packet::build(Protocol::Ipv6, &[9u8; 60], 5, 7, 2).unwrap()]);
        let mut dec = GseDecoder::new(&DecapConfig::default(), 2);
        let upper = dec.decapsulate(gse).unwrap();
        let packet = upper.front().unwrap();
        assert_eq!(packet.protocol(), Protocol::Ipv6);
        assert_eq!(packet.qos(), 5);
        assert_eq!(packet.src_tal_id(), 7);
        assert_eq!(packet.dst_tal_id(), 2);
        assert_eq!(packet.data(), &[9u8; 60]);
    }
}
