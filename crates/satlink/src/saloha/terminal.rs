// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Terminal-side Slotted-ALOHA transmitter.
//!
//! Each PDU (one or more slot-sized GSE packets) becomes a set of data
//! packets replicated over randomly chosen slots. Sent packets wait for an
//! ACK; a packet whose timeout (counted in Slotted-ALOHA frames) expires is
//! retransmitted with the same unique id — the gateway deduplicates — until
//! `max_retransmissions` is reached, then dropped.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::net::Burst;
use crate::saloha::{PduId, SaCtrlPacket, SaDataPacket, SaFrame, SaFrameKind, UniqueId, CTRL_ACK};
use crate::{Result, TalId};

/// Transmit-side knobs of one terminal.
#[derive(Debug, Clone)]
pub struct SalohaTalConfig {
    /// Replicas per data packet.
    pub nb_replicas: u16,
    /// ACK wait, in Slotted-ALOHA frames.
    pub timeout_saf: u16,
    /// Give up after this many retransmissions.
    pub max_retransmissions: u16,
}

impl Default for SalohaTalConfig {
    fn default() -> Self {
        Self { nb_replicas: 2, timeout_saf: 4, max_retransmissions: 3 }
    }
}

/// The terminal-side random-access transmitter.
#[derive(Debug)]
pub struct SalohaTerminal {
    tal_id: TalId,
    config: SalohaTalConfig,
    /// Slot geometry of the terminal's category.
    slots_per_carrier: u16,
    carriers: u16,
    pdu_counter: PduId,
    /// Packets awaiting their first (or next) transmission.
    pending: VecDeque<SaDataPacket>,
    /// Sent packets awaiting an ACK, keyed by unique id.
    wait_ack: BTreeMap<UniqueId, SaDataPacket>,
    rng: fastrand::Rng,
}

impl SalohaTerminal {
    pub fn new(
        tal_id: TalId,
        config: SalohaTalConfig,
        slots_per_carrier: u16,
        carriers: u16,
    ) -> Self {
        Self {
            tal_id,
            config,
            slots_per_carrier: slots_per_carrier.max(1),
            carriers: carriers.max(1),
            pdu_counter: 0,
            pending: VecDeque::new(),
            wait_ack: BTreeMap::new(),
            rng: fastrand::Rng::new(),
        }
    }

    /// Seed the slot picker (deterministic tests).
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }

    pub fn tal_id(&self) -> TalId {
        self.tal_id
    }

    /// Packets queued but not yet on the air.
    pub fn pending_packets(&self) -> usize {
        self.pending.len()
    }

    /// Packets on the air, unacknowledged.
    pub fn unacked_packets(&self) -> usize {
        self.wait_ack.len()
    }

    /// Queue one PDU: each member of `burst` (a slot-sized GSE packet)
    /// becomes one data packet of the PDU.
    pub fn enqueue(&mut self, burst: Burst) {
        let members: Vec<_> = burst.into_iter().collect();
        if members.is_empty() {
            return;
        }
        let pdu_nb = members.len() as u16;
        let pdu_id = self.pdu_counter;
        self.pdu_counter = self.pdu_counter.wrapping_add(1);
        for (seq, member) in members.iter().enumerate() {
            let mut packet = SaDataPacket::new(
                member.data(),
                pdu_id,
                0,
                seq as u16,
                pdu_nb,
                self.config.nb_replicas,
                self.config.timeout_saf,
            );
            packet.set_qos(member.qos());
            packet.set_src_tal_id(self.tal_id);
            self.pending.push_back(packet);
        }
        log::debug!(
            "terminal {}: PDU {} queued as {} packet(s)",
            self.tal_id,
            pdu_id,
            pdu_nb
        );
    }

    /// One Slotted-ALOHA frame tick: age the unacknowledged packets, then
    /// put the pending ones on the air.
    ///
    /// Returns the data frames to transmit.
    pub fn schedule(&mut self) -> Result<Vec<SaFrame>> {
        self.age_waiting();

        let total_slots = u32::from(self.slots_per_carrier) * u32::from(self.carriers);
        let nb_replicas = u32::from(self.config.nb_replicas.max(1));
        let mut chosen: BTreeSet<u16> = BTreeSet::new();
        let mut frames = Vec::new();
        let mut frame = SaFrame::new(SaFrameKind::Data);

        while let Some(mut packet) = self.pending.pop_front() {
            if chosen.len() as u32 + nb_replicas > total_slots {
                // channel exhausted for this frame, retry next tick
                self.pending.push_front(packet);
                break;
            }
            let replicas = self.pick_slots(nb_replicas as usize, &mut chosen);
            packet.set_replicas(&replicas)?;
            for &ts in &replicas {
                let mut replica = packet.clone();
                replica.set_ts(ts);
                if !frame.add_data_packet(&replica) {
                    frames.push(std::mem::replace(&mut frame, SaFrame::new(SaFrameKind::Data)));
                    if !frame.add_data_packet(&replica) {
                        log::error!(
                            "data packet of {} bytes larger than a whole frame, drop it",
                            replica.total_length()
                        );
                    }
                }
            }
            packet.set_timeout(self.config.timeout_saf);
            self.wait_ack.insert(packet.unique_id(), packet);
        }

        if !frame.is_empty() {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Distinct slot choices: distinct offsets within a carrier, each on a
    /// random carrier, avoiding slots already taken this tick.
    fn pick_slots(&mut self, count: usize, chosen: &mut BTreeSet<u16>) -> Vec<u16> {
        let mut slots = Vec::with_capacity(count);
        while slots.len() < count {
            let offset = self.rng.u16(0..self.slots_per_carrier);
            let carrier = self.rng.u16(0..self.carriers);
            let ts = carrier * self.slots_per_carrier + offset;
            if chosen.insert(ts) {
                slots.push(ts);
            }
        }
        slots
    }

    /// Process an inbound control frame, clearing acknowledged packets.
    pub fn on_rcv_frame(&mut self, frame: &SaFrame) -> Result<()> {
        for ctrl in frame.ctrl_packets()? {
            if ctrl.dst_tal_id() != self.tal_id {
                log::debug!("control packet for terminal {}, drop it", ctrl.dst_tal_id());
                continue;
            }
            self.on_ctrl_packet(&ctrl);
        }
        Ok(())
    }

    fn on_ctrl_packet(&mut self, ctrl: &SaCtrlPacket) {
        if ctrl.ctrl_type() != CTRL_ACK {
            log::debug!("control packet of type {} ignored", ctrl.ctrl_type());
            return;
        }
        match ctrl.unique_id() {
            Ok(unique_id) => {
                if self.wait_ack.remove(&unique_id).is_some() {
                    log::debug!("terminal {}: packet {} acknowledged", self.tal_id, unique_id);
                } else {
                    log::debug!(
                        "terminal {}: ACK for unknown packet {}",
                        self.tal_id,
                        unique_id
                    );
                }
            }
            Err(err) => log::error!("cannot read ACK payload ({}), drop it", err),
        }
    }

    /// Decrement timeouts; requeue or drop the expired packets.
    fn age_waiting(&mut self) {
        let mut expired = Vec::new();
        for (unique_id, packet) in &mut self.wait_ack {
            packet.dec_timeout();
            if packet.is_timed_out() {
                expired.push(*unique_id);
            }
        }
        for unique_id in expired {
            let Some(mut packet) = self.wait_ack.remove(&unique_id) else {
                continue;
            };
            if packet.can_be_retransmitted(self.config.max_retransmissions) {
                packet.inc_retransmissions();
                packet.set_timeout(self.config.timeout_saf);
                log::info!(
                    "terminal {}: packet {} timed out, retransmit it",
                    self.tal_id,
                    unique_id
                );
                self.pending.push_back(packet);
            } else {
                log::warn!(
                    "terminal {}: packet {} exhausted its retransmissions, drop it",
                    self.tal_id,
                    unique_id
                );
            }
        }
    }
}
