// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MPEG-TS decoder: SNDU reassembly from 188-byte cells.

use std::collections::BTreeMap;

use crate::mpeg::{
    dst_tal_id_from_pid, qos_from_pid, src_tal_id_from_pid, SNDU_HEADER_SIZE, TS_HEADER_SIZE,
    TS_PACKET_SIZE, TS_PADDING_BYTE, TS_SYNC_BYTE,
};
use crate::net::{Burst, Packet, Protocol};
use crate::{Qos, Result, SpotId, TalId, BROADCAST_TAL_ID};

/// Reassembly state of one PID.
#[derive(Debug, Default)]
struct PidContext {
    /// SNDU under reassembly (header included, possibly still partial).
    partial: Vec<u8>,
    last_cc: Option<u8>,
}

impl PidContext {
    fn expected(&self) -> Option<usize> {
        if self.partial.len() < 2 {
            return None;
        }
        Some(usize::from(u16::from_be_bytes([self.partial[0], self.partial[1]])))
    }
}

/// Stateful MPEG-TS decoder (receive side).
#[derive(Debug)]
pub struct MpegDecoder {
    contexts: BTreeMap<u16, PidContext>,
    /// This node's terminal id; cells for other destinations are dropped.
    dst_tal_id: TalId,
}

impl MpegDecoder {
    pub fn new(dst_tal_id: TalId) -> Self {
        Self { contexts: BTreeMap::new(), dst_tal_id }
    }

    pub fn set_filter_tal_id(&mut self, dst_tal_id: TalId) {
        self.dst_tal_id = dst_tal_id;
    }

    fn keeps(&self, dst_tal_id: TalId) -> bool {
        dst_tal_id == self.dst_tal_id || dst_tal_id == BROADCAST_TAL_ID
    }

    /// De-encapsulate a burst of MPEG-TS cells into upper packets.
    pub fn decapsulate(&mut self, burst: Burst) -> Result<Burst> {
        let mut upper = Burst::new();
        for cell in burst {
            if let Err(err) = self.decap_cell(&cell, &mut upper) {
                log::error!("broken MPEG cell ({}), drop it", err);
            }
        }
        Ok(upper)
    }

    fn decap_cell(&mut self, cell: &Packet, upper: &mut Burst) -> Result<()> {
        let data = cell.data();
        if data.len() != TS_PACKET_SIZE {
            return Err(crate::Error::Malformed(format!(
                "cell of {} bytes instead of {}",
                data.len(),
                TS_PACKET_SIZE
            )));
        }
        if data[0] != TS_SYNC_BYTE {
            return Err(crate::Error::Malformed(format!(
                "bad synchronisation byte 0x{:02x}",
                data[0]
            )));
        }
        let pusi = data[1] & 0x40 != 0;
        let pid = u16::from(data[1] & 0x1F) << 8 | u16::from(data[2]);
        let cc = data[3] & 0x0F;
        let src = src_tal_id_from_pid(pid);
        let dst = dst_tal_id_from_pid(pid);
        let qos = qos_from_pid(pid);

        if !self.keeps(dst) {
            log::info!("MPEG cell is for terminal {}, drop it", dst);
            return Ok(());
        }

        let context = self.contexts.entry(pid).or_default();
        if let Some(previous) = context.last_cc {
            if cc != (previous + 1) & 0x0F && !context.partial.is_empty() {
                log::error!(
                    "continuity break on PID 0x{:04x} ({} then {}), drop the partial SNDU",
                    pid,
                    previous,
                    cc
                );
                context.partial.clear();
            }
        }
        context.last_cc = Some(cc);

        let payload = &data[TS_HEADER_SIZE..];
        let (continuation, mut region) = if pusi {
            let pointer = usize::from(payload[0]);
            let rest = &payload[1..];
            if pointer > rest.len() {
                return Err(crate::Error::Malformed(format!(
                    "payload pointer {} beyond the cell payload",
                    pointer
                )));
            }
            (&rest[..pointer], &rest[pointer..])
        } else {
            (payload, &[][..])
        };

        // bytes belonging to the SNDU left over from previous cells
        if !continuation.is_empty() {
            if context.partial.is_empty() {
                // its start was lost with an earlier cell
                log::debug!("continuation bytes without a pending SNDU, drop them");
            } else {
                context.partial.extend_from_slice(continuation);
                Self::try_complete(context, src, dst, qos, cell.dst_spot(), upper);
            }
        }

        // SNDUs starting in this cell
        while !region.is_empty() {
            if region[0] == TS_PADDING_BYTE {
                break;
            }
            if region.len() < SNDU_HEADER_SIZE {
                // the SNDU header itself continues in the next cell
                context.partial = region.to_vec();
                break;
            }
            let length = usize::from(u16::from_be_bytes([region[0], region[1]]));
            if length < SNDU_HEADER_SIZE {
                return Err(crate::Error::Malformed(format!(
                    "SNDU length {} below its header size",
                    length
                )));
            }
            if region.len() < length {
                context.partial = region.to_vec();
                break;
            }
            Self::emit_sndu(&region[..length], src, dst, qos, cell.dst_spot(), upper);
            region = &region[length..];
        }
        Ok(())
    }

    /// Emit the pending SNDU once all its bytes arrived.
    fn try_complete(
        context: &mut PidContext,
        src: TalId,
        dst: TalId,
        qos: Qos,
        dst_spot: SpotId,
        upper: &mut Burst,
    ) {
        let Some(expected) = context.expected() else {
            return;
        };
        if expected < SNDU_HEADER_SIZE {
            log::error!("pending SNDU declares {} bytes, below its header size", expected);
            context.partial.clear();
            return;
        }
        if context.partial.len() < expected {
            return;
        }
        if context.partial.len() > expected {
            log::error!(
                "continuation carries {} bytes for a {}-byte SNDU, drop it",
                context.partial.len(),
                expected
            );
            context.partial.clear();
            return;
        }
        let sndu = std::mem::take(&mut context.partial);
        Self::emit_sndu(&sndu, src, dst, qos, dst_spot, upper);
    }

    fn emit_sndu(
        sndu: &[u8],
        src: TalId,
        dst: TalId,
        qos: Qos,
        dst_spot: SpotId,
        upper: &mut Burst,
    ) {
        let protocol_id = u16::from_be_bytes([sndu[2], sndu[3]]);
        let Some(protocol) = Protocol::from_id(protocol_id) else {
            log::error!("unknown SNDU protocol type 0x{:04x}, drop it", protocol_id);
            return;
        };
        match Packet::build(protocol, &sndu[SNDU_HEADER_SIZE..], qos, src, dst) {
            Ok(mut packet) => {
                packet.set_dst_spot(dst_spot);
                upper.add(packet);
            }
            Err(err) => log::error!("cannot rebuild a {} packet: {}", protocol, err),
        }
    }
}
