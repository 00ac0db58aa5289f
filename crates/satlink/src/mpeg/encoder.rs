// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MPEG-TS encoder: SNDU packing into 188-byte cells.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::EncapConfig;
use crate::gse::{FlushIntent, GseIdentifier};
use crate::mpeg::{
    pid, SNDU_HEADER_SIZE, TS_DATA_SIZE, TS_HEADER_SIZE, TS_PACKET_SIZE, TS_PADDING_BYTE,
    TS_SYNC_BYTE,
};
use crate::net::{Burst, Packet, Protocol};
use crate::{Error, Result, SpotId};

/// A cell under construction for one PID.
///
/// The payload accumulates without its header; whether the cell spends a
/// byte on the payload pointer is only known once an SNDU starts in it.
#[derive(Debug)]
struct CellContext {
    payload: Vec<u8>,
    /// Offset of the first SNDU boundary in `payload`, if one is in the cell.
    pusi_offset: Option<usize>,
    cc: u8,
    dst_spot: SpotId,
}

impl CellContext {
    fn new(dst_spot: SpotId) -> Self {
        Self {
            payload: Vec::with_capacity(TS_DATA_SIZE),
            pusi_offset: None,
            cc: 0,
            dst_spot,
        }
    }

    /// Payload capacity of the current cell (one byte less when it must
    /// carry a payload pointer).
    fn capacity(&self) -> usize {
        if self.pusi_offset.is_some() {
            TS_DATA_SIZE - 1
        } else {
            TS_DATA_SIZE
        }
    }

    fn is_full(&self) -> bool {
        self.payload.len() >= self.capacity()
    }

    fn has_data(&self) -> bool {
        !self.payload.is_empty()
    }
}

/// Serialise one cell, padding the unused tail.
fn build_cell(pid: u16, context: &mut CellContext) -> Vec<u8> {
    let mut cell = Vec::with_capacity(TS_PACKET_SIZE);
    let pusi = context.pusi_offset.is_some();
    cell.push(TS_SYNC_BYTE);
    cell.push(if pusi { 0x40 } else { 0x00 } | ((pid >> 8) & 0x1F) as u8);
    cell.push((pid & 0xFF) as u8);
    // no scrambling, payload only, 4-bit continuity counter
    cell.push(0x10 | (context.cc & 0x0F));
    if let Some(offset) = context.pusi_offset {
        cell.push(offset as u8);
    }
    cell.extend_from_slice(&context.payload);
    cell.resize(TS_PACKET_SIZE, TS_PADDING_BYTE);

    context.payload.clear();
    context.pusi_offset = None;
    context.cc = (context.cc + 1) & 0x0F;
    cell
}

/// Stateful MPEG-TS encoder (transmit side).
///
/// Shares the encoder surface of the GSE side: `encapsulate` returns the
/// produced cells plus deferred-flush intents, `flush(context_id)` closes
/// a cell kept open for packing (padding its tail).
#[derive(Debug)]
pub struct MpegEncoder {
    contexts: BTreeMap<GseIdentifier, CellContext>,
    packing_threshold: Duration,
}

impl MpegEncoder {
    pub fn new(config: &EncapConfig) -> Self {
        Self { contexts: BTreeMap::new(), packing_threshold: config.packing_threshold }
    }

    /// Encapsulate an upper burst into MPEG-TS cells.
    pub fn encapsulate(&mut self, burst: Burst) -> Result<(Burst, Vec<FlushIntent>)> {
        let mut cells = Burst::new();
        let mut touched: Vec<GseIdentifier> = Vec::new();

        for packet in burst {
            if let Err(err) = self.encap_packet(&packet, &mut cells, &mut touched) {
                log::error!(
                    "cannot encapsulate a {} packet (src {} dst {} qos {}): {}, drop it",
                    packet.protocol(),
                    packet.src_tal_id(),
                    packet.dst_tal_id(),
                    packet.qos(),
                    err
                );
            }
        }

        let mut intents = Vec::new();
        for ident in touched {
            let open = self.contexts.get(&ident).is_some_and(CellContext::has_data);
            if !open {
                continue;
            }
            if self.packing_threshold.is_zero() {
                self.close_cell(ident, &mut cells)?;
            } else {
                intents.push(FlushIntent {
                    delay: self.packing_threshold,
                    context_id: ident.context_id(),
                });
            }
        }
        Ok((cells, intents))
    }

    fn encap_packet(
        &mut self,
        packet: &Packet,
        cells: &mut Burst,
        touched: &mut Vec<GseIdentifier>,
    ) -> Result<()> {
        let total = SNDU_HEADER_SIZE + packet.total_length();
        if total > usize::from(u16::MAX) {
            return Err(Error::PduTooLarge { max: usize::from(u16::MAX), actual: total });
        }
        let mut sndu = Vec::with_capacity(total);
        sndu.extend_from_slice(&(total as u16).to_be_bytes());
        sndu.extend_from_slice(&packet.protocol().id().to_be_bytes());
        sndu.extend_from_slice(packet.data());

        let ident =
            GseIdentifier::new(packet.src_tal_id(), packet.dst_tal_id(), packet.qos());
        if !touched.contains(&ident) {
            touched.push(ident);
        }
        let context = self
            .contexts
            .entry(ident)
            .or_insert_with(|| CellContext::new(packet.dst_spot()));
        context.dst_spot = packet.dst_spot();
        let pid_value = ident.context_id();

        // an SNDU can only start where a payload pointer can still reach
        if context.payload.len() >= TS_DATA_SIZE - 1 {
            let cell = build_cell(pid_value, context);
            push_cell(cells, cell, ident, context.dst_spot);
        }
        if context.pusi_offset.is_none() {
            context.pusi_offset = Some(context.payload.len());
        }

        let mut offset = 0;
        while offset < sndu.len() {
            let room = context.capacity() - context.payload.len();
            let take = room.min(sndu.len() - offset);
            context.payload.extend_from_slice(&sndu[offset..offset + take]);
            offset += take;
            if context.is_full() {
                let cell = build_cell(pid_value, context);
                push_cell(cells, cell, ident, context.dst_spot);
            }
        }
        Ok(())
    }

    fn close_cell(&mut self, ident: GseIdentifier, cells: &mut Burst) -> Result<()> {
        let Some(context) = self.contexts.get_mut(&ident) else {
            return Err(Error::UnknownContext(ident.context_id()));
        };
        if !context.has_data() {
            return Ok(());
        }
        let dst_spot = context.dst_spot;
        let cell = build_cell(ident.context_id(), context);
        push_cell(cells, cell, ident, dst_spot);
        Ok(())
    }

    /// Close the cell kept open under `context_id`, padding its tail.
    pub fn flush(&mut self, context_id: u16) -> Result<Burst> {
        let ident = GseIdentifier::from_context_id(context_id);
        if !self.contexts.contains_key(&ident) {
            return Err(Error::UnknownContext(context_id));
        }
        let mut cells = Burst::new();
        self.close_cell(ident, &mut cells)?;
        Ok(cells)
    }

    /// Close every open cell.
    pub fn flush_all(&mut self) -> Result<Burst> {
        let idents: Vec<GseIdentifier> = self
            .contexts
            .iter()
            .filter(|(_, context)| context.has_data())
            .map(|(ident, _)| *ident)
            .collect();
        let mut cells = Burst::new();
        for ident in idents {
            self.close_cell(ident, &mut cells)?;
        }
        Ok(cells)
    }
}

fn push_cell(cells: &mut Burst, cell: Vec<u8>, ident: GseIdentifier, dst_spot: SpotId) {
    debug_assert_eq!(cell.len(), TS_PACKET_SIZE);
    debug_assert_eq!(pid(ident.src_tal_id, ident.dst_tal_id, ident.qos), ident.context_id());
    let mut packet = Packet::from_parts(
        Protocol::Mpeg,
        cell,
        ident.qos,
        ident.src_tal_id,
        ident.dst_tal_id,
        TS_HEADER_SIZE,
        0,
    );
    packet.set_dst_spot(dst_spot);
    cells.add(packet);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder(threshold_ms: u64) -> MpegEncoder {
        MpegEncoder::new(&EncapConfig {
            packing_threshold: Duration::from_millis(threshold_ms),
            ..EncapConfig::default()
        })
    }

    fn ip_packet(len: usize, qos: u8) -> Packet {
        Packet::build(Protocol::Ipv4, &vec![0xAA; len], qos, 1, 2).unwrap()
    }

    #[test]
    fn small_packet_fits_one_padded_cell() {
        let mut enc = encoder(0);
        let (cells, intents) =
            enc.encapsulate(std::iter::once(ip_packet(60, 3)).collect()).unwrap();
        assert!(intents.is_empty());
        assert_eq!(cells.len(), 1);
        let cell = cells.front().unwrap();
        assert_eq!(cell.total_length(), TS_PACKET_SIZE);
        let data = cell.data();
        assert_eq!(data[0], TS_SYNC_BYTE);
        assert_eq!(data[1] & 0x40, 0x40, "PUSI set, an SNDU starts here");
        assert_eq!(data[4], 0, "payload pointer at the cell start");
        // SNDU header: length then protocol type
        assert_eq!(u16::from_be_bytes([data[5], data[6]]), 64);
        assert_eq!(u16::from_be_bytes([data[7], data[8]]), Protocol::Ipv4.id());
        // padded tail
        assert_eq!(data[TS_PACKET_SIZE - 1], TS_PADDING_BYTE);
    }

    #[test]
    fn pid_carries_the_addressing() {
        let mut enc = encoder(0);
        let (cells, _) = enc.encapsulate(std::iter::once(ip_packet(60, 3)).collect()).unwrap();
        let data = cells.front().unwrap().data().to_vec();
        let pid_value = u16::from(data[1] & 0x1F) << 8 | u16::from(data[2]);
        assert_eq!(pid_value, pid(1, 2, 3));
    }

    #[test]
    fn large_packet_spans_cells_with_increasing_cc() {
        let mut enc = encoder(0);
        let (cells, _) = enc.encapsulate(std::iter::once(ip_packet(500, 0)).collect()).unwrap();
        assert_eq!(cells.len(), 3, "504-byte SNDU needs three cells");
        let ccs: Vec<u8> = cells.iter().map(|cell| cell.data()[3] & 0x0F).collect();
        assert_eq!(ccs, vec![0, 1, 2]);
        // only the first cell starts an SNDU
        let pusis: Vec<bool> = cells.iter().map(|cell| cell.data()[1] & 0x40 != 0).collect();
        assert_eq!(pusis, vec![true, false, false]);
    }

    #[test]
    fn packing_threshold_keeps_the_cell_open() {
        let mut enc = encoder(50);
        let (cells, intents) =
            enc.encapsulate(std::iter::once(ip_packet(40, 3)).collect()).unwrap();
        assert!(cells.is_empty());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].context_id, 0x113);

        // a second packet packs into the same cell
        let (cells, _) = enc.encapsulate(std::iter::once(ip_packet(40, 3)).collect()).unwrap();
        assert!(cells.is_empty());

        let cells = enc.flush(0x113).unwrap();
        assert_eq!(cells.len(), 1);
    }

    #[test]
    fn flush_unknown_context_fails() {
        let mut enc = encoder(50);
        assert!(matches!(enc.flush(0x777), Err(Error::UnknownContext(0x777))));
    }
}
