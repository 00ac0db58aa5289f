// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Slotted-ALOHA terminal categories.

use std::collections::BTreeMap;

use crate::fmt::{FmtTable, UnitConverter};
use crate::saloha::SaDataPacket;
use crate::terminal::{CarrierGroup, Slot};

/// A set of carrier groups sharing a scheduling policy, plus the slot
/// inventory and per-tick bookkeeping of the random-access channel.
#[derive(Debug)]
pub struct TerminalCategory {
    label: String,
    carriers: Vec<CarrierGroup>,
    /// Slot inventory, ids unique within the category: the union of the
    /// per-carrier contiguous ranges laid out by [`Self::compute_slots`].
    slots: BTreeMap<u16, Slot>,
    accepted_packets: Vec<SaDataPacket>,
    received_packets_nbr: u32,
}

impl TerminalCategory {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            carriers: Vec::new(),
            slots: BTreeMap::new(),
            accepted_packets: Vec::new(),
            received_packets_nbr: 0,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn add_carrier_group(&mut self, group: CarrierGroup) {
        self.carriers.push(group);
    }

    pub fn carrier_groups(&self) -> &[CarrierGroup] {
        &self.carriers
    }

    /// Number of carriers across all groups.
    pub fn carriers_number(&self) -> u32 {
        self.carriers.iter().map(CarrierGroup::carriers_number).sum::<u32>().max(1)
    }

    /// Size the slot inventory from the carrier groups.
    ///
    /// Each group with a non-empty FMT group contributes
    /// `converter.slots_number(symbol_rate)` slots per carrier (using the
    /// first MODCOD's modulation efficiency); slot ids are numbered
    /// globally within the category, each carrier getting a contiguous
    /// range.
    pub fn compute_slots(&mut self, converter: &mut UnitConverter, fmt_table: &FmtTable) {
        self.slots.clear();
        let mut next_id: u32 = 0;
        for group in &mut self.carriers {
            let mut slots_per_carrier = 0u16;
            if let Some(fmt_id) = group.fmt_group().first() {
                match fmt_table.definition(fmt_id) {
                    Some(definition) => {
                        converter.set_modulation_efficiency(definition.modulation.efficiency());
                        slots_per_carrier = converter.slots_number(group.symbol_rate());
                    }
                    None => {
                        log::warn!(
                            "carrier group {} references unknown MODCOD {}, no slots",
                            group.carriers_id(),
                            fmt_id
                        );
                    }
                }
            }
            group.set_slots_per_carrier(slots_per_carrier);
            for _ in 0..group.carriers_number() {
                for _ in 0..slots_per_carrier {
                    let id = next_id as u16;
                    self.slots.insert(id, Slot::new(group.carriers_id(), id));
                    next_id += 1;
                }
            }
        }
        log::debug!("category {}: {} slots", self.label, self.slots.len());
    }

    pub fn slots_number(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Slots per single carrier, used by the acceptance interleaver.
    pub fn slots_per_carrier(&self) -> u32 {
        self.slots_number() / self.carriers_number()
    }

    pub fn slots(&self) -> &BTreeMap<u16, Slot> {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut BTreeMap<u16, Slot> {
        &mut self.slots
    }

    pub fn accepted_packets_mut(&mut self) -> &mut Vec<SaDataPacket> {
        &mut self.accepted_packets
    }

    pub fn take_accepted_packets(&mut self) -> Vec<SaDataPacket> {
        std::mem::take(&mut self.accepted_packets)
    }

    pub fn increase_received_packets(&mut self) {
        self.received_packets_nbr += 1;
    }

    pub fn received_packets_nbr(&self) -> u32 {
        self.received_packets_nbr
    }

    pub fn reset_received_packets(&mut self) {
        self.received_packets_nbr = 0;
    }

    /// Split borrow for collision resolution: the slot map and the
    /// accepted vector are needed mutably at the same time.
    pub fn collision_state_mut(
        &mut self,
    ) -> (&mut BTreeMap<u16, Slot>, &mut Vec<SaDataPacket>) {
        (&mut self.slots, &mut self.accepted_packets)
    }
}
