// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway-side Slotted-ALOHA controller.
//!
//! Receive path: data frames are torn into packets which land in the slot
//! named by their `ts` field. Schedule path (once per Slotted-ALOHA
//! superframe): inject synthetic traffic, resolve collisions, acknowledge
//! the survivors, feed reassembly and hand complete PDUs upward as GSE
//! packets.

use std::collections::BTreeMap;

use crate::config::SalohaConfig;
use crate::fmt::{FmtTable, UnitConverter};
use crate::gse;
use crate::net::Burst;
use crate::saloha::algo::remove_collisions;
use crate::saloha::reassembly::PropagateState;
use crate::saloha::{SaCtrlPacket, SaDataPacket, SaFrame, SaFrameKind, SlottedAlohaSimu};
use crate::terminal::TerminalCatalog;
use crate::{Result, SpotId, SuperframeId, BROADCAST_TAL_ID};

/// Collision figures of one category for one schedule tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryStats {
    /// Packets sitting in multi-occupancy slots before the algorithm ran.
    pub collisions_before: u16,
    /// Packets lost to collisions after the algorithm ran.
    pub collisions: u16,
    /// `collisions * 100 / total_slots`.
    pub collisions_ratio: u16,
}

/// What one schedule tick produced.
#[derive(Debug, Default)]
pub struct ScheduleOutput {
    /// Recovered GSE packets, ready for de-encapsulation.
    pub burst: Burst,
    /// Completed ACK control frames.
    pub control_frames: Vec<SaFrame>,
}

/// The gateway-side random-access controller.
#[derive(Debug)]
pub struct SalohaController {
    catalog: TerminalCatalog,
    config: SalohaConfig,
    simulations: Vec<SlottedAlohaSimu>,
    spot_id: SpotId,
    /// Superframes per Slotted-ALOHA frame (schedule tick divisor).
    sf_per_saframe: u16,
    stats: BTreeMap<String, CategoryStats>,
    rng: fastrand::Rng,
}

impl SalohaController {
    /// Build the controller and size the slot inventories.
    pub fn new(
        config: SalohaConfig,
        mut catalog: TerminalCatalog,
        spot_id: SpotId,
        sf_per_saframe: u16,
        converter: &mut UnitConverter,
        fmt_table: &FmtTable,
    ) -> Result<Self> {
        if spot_id == 0 {
            log::error!("wrong spot id 0");
        }
        catalog.compute_slots(converter, fmt_table);

        let mut simulations = Vec::new();
        for profile in &config.simulations {
            if profile.nb_max_packets == 0 {
                log::info!(
                    "simulation profile for category {} with 0 packets, ignore it",
                    profile.category
                );
                continue;
            }
            if catalog.category(&profile.category).is_none() {
                log::warn!(
                    "simulation profile for category {} which has no random-access carriers",
                    profile.category
                );
                continue;
            }
            simulations.push(SlottedAlohaSimu::new(profile));
        }
        log::info!("Slotted Aloha initialised with the {} algorithm", config.algorithm);

        Ok(Self {
            catalog,
            config,
            simulations,
            spot_id,
            sf_per_saframe: sf_per_saframe.max(1),
            stats: BTreeMap::new(),
            rng: fastrand::Rng::new(),
        })
    }

    /// Seed the internal RNG (deterministic synthetic traffic in tests).
    pub fn seed_rng(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }

    /// Register a terminal (idempotent).
    pub fn add_terminal(&mut self, tal_id: crate::TalId) -> Result<()> {
        self.catalog.add_terminal(tal_id)
    }

    pub fn catalog(&self) -> &TerminalCatalog {
        &self.catalog
    }

    /// Collision statistics of the last schedule tick.
    pub fn stats(&self, category: &str) -> CategoryStats {
        self.stats.get(category).copied().unwrap_or_default()
    }

    fn is_saloha_frame_tick(&self, superframe: SuperframeId) -> bool {
        superframe % self.sf_per_saframe == 0
    }

    /// Receive path: deposit a data frame's packets into their slots.
    pub fn on_rcv_frame(&mut self, frame: &SaFrame) -> Result<()> {
        if frame.packet_count() == 0 {
            log::debug!("skip Slotted Aloha frame with no packet");
            return Ok(());
        }
        log::info!("receive Slotted Aloha frame containing {} packets", frame.packet_count());

        for mut packet in frame.data_packets()? {
            // addressing lives in the encapsulated GSE packet
            let (src_tal_id, _, qos) = match gse::packet_addressing(packet.payload()) {
                Ok(addressing) => addressing,
                Err(err) => {
                    log::error!("cannot read inner packet addressing ({}), drop packet", err);
                    continue;
                }
            };
            packet.set_src_tal_id(src_tal_id);
            packet.set_qos(qos);

            let Some(terminal) = self.catalog.terminal(src_tal_id) else {
                log::error!("Slotted Aloha packet from unknown terminal {}", src_tal_id);
                continue;
            };
            let label = terminal.category().to_string();
            let ts = packet.ts();
            let Some(category) = self.catalog.category_mut(&label) else {
                log::error!("terminal {} references unknown category {}", src_tal_id, label);
                continue;
            };
            match category.slots_mut().get_mut(&ts) {
                Some(slot) => {
                    slot.push(packet);
                    category.increase_received_packets();
                }
                None => {
                    log::error!("packet received on slot {} that does not exist", ts);
                }
            }
        }
        Ok(())
    }

    /// Schedule path, driven once per superframe.
    pub fn schedule(&mut self, superframe: SuperframeId) -> Result<ScheduleOutput> {
        let mut output = ScheduleOutput::default();
        if !self.is_saloha_frame_tick(superframe) {
            return Ok(output);
        }
        for label in self.catalog.category_labels() {
            self.schedule_category(&label, &mut output)?;
        }
        Ok(output)
    }

    fn schedule_category(&mut self, label: &str, output: &mut ScheduleOutput) -> Result<()> {
        // refresh the figures even when there is no traffic
        self.stats.insert(label.to_string(), CategoryStats::default());

        let Some(category) = self.catalog.category_mut(label) else {
            return Ok(());
        };
        if category.received_packets_nbr() == 0 {
            log::debug!("no packet to schedule in category {}", label);
            return Ok(());
        }

        for simulation in &self.simulations {
            if simulation.category() == label {
                simulation.simulate(category, &mut self.rng);
            }
        }
        category.reset_received_packets();

        // collision resolution over the whole category, as if it were one
        // large carrier
        log::debug!("remove collisions on category {}", label);
        let slots_number = category.slots_number().max(1);
        let slots_per_carrier = category.slots_per_carrier().max(1);
        let (slots, accepted) = category.collision_state_mut();
        let collisions_before = slots
            .values()
            .filter(|slot| slot.len() > 1)
            .map(|slot| slot.len() as u16)
            .sum();
        let collisions = remove_collisions(self.config.algorithm, slots, accepted);
        // interleave acceptance across carriers before reassembly
        accepted.sort_by_key(|packet| u32::from(packet.ts()) % slots_per_carrier);
        self.stats.insert(
            label.to_string(),
            CategoryStats {
                collisions_before,
                collisions,
                collisions_ratio: (u32::from(collisions) * 100 / slots_number) as u16,
            },
        );

        let accepted = category.take_accepted_packets();
        self.propagate_accepted(label, accepted, output)
    }

    /// ACK the accepted packets and feed them through reassembly.
    fn propagate_accepted(
        &mut self,
        label: &str,
        accepted: Vec<SaDataPacket>,
        output: &mut ScheduleOutput,
    ) -> Result<()> {
        let mut frame = SaFrame::new(SaFrameKind::Ctrl);
        frame.set_spot_id(self.spot_id);

        let (_, terminals) = self.catalog.parts_mut();
        for packet in accepted {
            let tal_id = packet.src_tal_id();
            if tal_id > BROADCAST_TAL_ID {
                log::debug!("drop Slotted Aloha simulation packet");
                continue;
            }
            let unique_id = packet.unique_id();

            let Some(terminal) = terminals.get_mut(&tal_id) else {
                log::error!("cannot find terminal {} associated with packet", tal_id);
                continue;
            };
            if terminal.category() != label {
                log::error!(
                    "wrong category {} for packet with source terminal {}",
                    label,
                    tal_id
                );
                continue;
            }

            let ack = SaCtrlPacket::ack(unique_id, tal_id);
            if frame.free_space() < ack.total_length() {
                output.control_frames.push(std::mem::replace(&mut frame, {
                    let mut next = SaFrame::new(SaFrameKind::Ctrl);
                    next.set_spot_id(self.spot_id);
                    next
                }));
            }
            if !frame.add_ctrl_packet(&ack) {
                log::error!("failed to add an ACK in the signal control frame");
                continue;
            }
            log::info!("ack packet {} on terminal {}", unique_id, tal_id);

            match terminal.add_packet(packet) {
                PropagateState::NoPropagation => {
                    log::info!(
                        "received packet {} from terminal {}, no complete PDU yet",
                        unique_id,
                        tal_id
                    );
                }
                PropagateState::Propagate(pdu) => {
                    log::info!(
                        "complete PDU {} received from terminal {}",
                        unique_id.pdu_id,
                        tal_id
                    );
                    for member in pdu {
                        match gse::build_packet(member.payload()) {
                            Ok(inner) => {
                                output.burst.add(inner);
                            }
                            Err(err) => {
                                log::error!("cannot rebuild the inner packet ({}), drop it", err);
                            }
                        }
                    }
                }
            }
        }

        if !frame.is_empty() {
            output.control_frames.push(frame);
        }
        log::info!(
            "Slotted Aloha scheduled, {} control frame(s) to send",
            output.control_frames.len()
        );
        Ok(())
    }
}
