// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-terminal PDU reassembly for the random-access channel.
//!
//! Data packets accumulate per QoS and PDU id until `pdu_nb` of them are
//! present, then propagate sorted by sequence number. The book is bounded
//! by oldest-id aging: when the completion counter outruns
//! [`MAX_OLD_COUNTER`], the oldest pending PDU is dropped and the next
//! oldest found by minimum modular distance (PDU ids wrap).

use std::collections::BTreeMap;

use crate::saloha::{PduId, SaDataPacket};
use crate::{Qos, TalId};

/// Completed-PDU counter bound before the oldest pending PDU is evicted.
pub const MAX_OLD_COUNTER: u32 = 65_535;

/// Outcome of adding a packet to the book.
#[derive(Debug)]
pub enum PropagateState {
    /// A PDU completed: its packets, sorted by sequence number.
    Propagate(Vec<SaDataPacket>),
    NoPropagation,
}

/// Reassembly book of one terminal.
#[derive(Debug)]
pub struct TerminalContext {
    tal_id: TalId,
    category: String,
    /// Pending packets: `qos -> pdu_id -> packets received so far`.
    wait_propagation: BTreeMap<Qos, BTreeMap<PduId, Vec<SaDataPacket>>>,
    /// Per-QoS id of the oldest pending PDU.
    oldest_id: BTreeMap<Qos, PduId>,
    /// PDUs completed since the oldest pending PDU was recorded.
    old_count: u32,
}

impl TerminalContext {
    pub fn new(tal_id: TalId, category: String) -> Self {
        Self {
            tal_id,
            category,
            wait_propagation: BTreeMap::new(),
            oldest_id: BTreeMap::new(),
            old_count: 0,
        }
    }

    pub fn tal_id(&self) -> TalId {
        self.tal_id
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Number of pending (incomplete) PDUs across all QoS classes.
    pub fn pending_pdus(&self) -> usize {
        self.wait_propagation.values().map(BTreeMap::len).sum()
    }

    #[cfg(test)]
    pub(crate) fn old_count(&self) -> u32 {
        self.old_count
    }

    /// Add a received packet; a complete PDU is detached and returned.
    ///
    /// A PDU completes as soon as `pdu_nb` packets are present, even if an
    /// earlier PDU is still pending. Packets are not unique across
    /// retransmissions: a member whose sequence number is already present
    /// is ignored rather than counted twice.
    pub fn add_packet(&mut self, packet: SaDataPacket) -> PropagateState {
        let qos = packet.qos();
        let pdu_id = packet.pdu_id();
        let pdu_nb = usize::from(packet.pdu_nb());

        let pdus = self.wait_propagation.entry(qos).or_default();
        let pending = pdus.entry(pdu_id).or_default();
        if pending.iter().any(|member| member.seq() == packet.seq()) {
            log::debug!(
                "retransmitted packet (PDU {}, seq {}) already held, ignore it",
                pdu_id,
                packet.seq()
            );
            return PropagateState::NoPropagation;
        }
        pending.push(packet);

        if pending.len() == pdu_nb {
            let mut pdu = pdus.remove(&pdu_id).unwrap_or_default();
            // losses can reorder arrivals, restore sequence order
            pdu.sort_by_key(SaDataPacket::seq);
            self.old_count += 1;
            self.handle_oldest(qos, pdu_id);
            return PropagateState::Propagate(pdu);
        }

        if !self.oldest_id.contains_key(&qos) {
            self.oldest_id.insert(qos, pdu_id);
            self.old_count = 0;
        }
        PropagateState::NoPropagation
    }

    /// Oldest-id upkeep, run after each completion.
    fn handle_oldest(&mut self, qos: Qos, current_id: PduId) {
        let Some(&oldest) = self.oldest_id.get(&qos) else {
            return;
        };
        if oldest == current_id {
            self.find_oldest(qos);
            return;
        }
        if self.old_count > MAX_OLD_COUNTER {
            // the oldest PDU will never complete, its partial data is lost
            log::warn!(
                "likely lost a packet of PDU {} on terminal {}, drop its pending content",
                oldest,
                self.tal_id
            );
            if let Some(pdus) = self.wait_propagation.get_mut(&qos) {
                pdus.remove(&oldest);
            }
            self.find_oldest(qos);
        }
    }

    /// Point `oldest_id[qos]` at the pending PDU closest (in wrapping
    /// distance) after the previous oldest, or clear it when none remain.
    fn find_oldest(&mut self, qos: Qos) {
        let Some(&previous) = self.oldest_id.get(&qos) else {
            return;
        };
        let pending = self.wait_propagation.get(&qos);
        let Some(pending) = pending.filter(|pdus| !pdus.is_empty()) else {
            self.oldest_id.remove(&qos);
            return;
        };
        let mut min_diff = PduId::MAX;
        let mut oldest = previous;
        for &pdu_id in pending.keys() {
            // wrapping distance handles id rollover
            let diff = pdu_id.wrapping_sub(previous);
            if diff < min_diff {
                min_diff = diff;
                oldest = pdu_id;
            }
        }
        self.oldest_id.insert(qos, oldest);
        self.old_count = 0;
    }
}
