// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Synthetic random-access traffic.
//!
//! Simulated terminals load the channel without ever being acknowledged:
//! their source tal ids sit above the broadcast id, so the schedule path
//! filters them out after collision resolution.

use crate::config::SimulationProfile;
use crate::saloha::SaDataPacket;
use crate::terminal::TerminalCategory;
use crate::BROADCAST_TAL_ID;

/// One category's synthetic-traffic generator.
#[derive(Debug, Clone)]
pub struct SlottedAlohaSimu {
    category: String,
    nb_tal: u16,
    nb_packets_per_tal: u16,
    nb_replicas: u16,
}

impl SlottedAlohaSimu {
    /// Derive generator parameters from a configuration profile: each
    /// simulated terminal contributes one PDU of `nb_replicas` replicas
    /// per tick, and the terminal count follows from the load ratio.
    pub fn new(profile: &SimulationProfile) -> Self {
        let nb_replicas = profile.nb_replicas.max(1);
        let packets = u32::from(profile.nb_max_packets) * u32::from(profile.ratio) / 100;
        // tal ids above broadcast are an 8-bit space, cap the fleet there
        let nb_tal = (packets / u32::from(nb_replicas))
            .clamp(1, u32::from(u8::MAX - BROADCAST_TAL_ID) - 1) as u16;
        Self {
            category: profile.category.clone(),
            nb_tal,
            nb_packets_per_tal: nb_replicas,
            nb_replicas,
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn nb_tal(&self) -> u16 {
        self.nb_tal
    }

    pub fn nb_replicas(&self) -> u16 {
        self.nb_replicas
    }

    /// Deposit this tick's synthetic replicas into the category's slots.
    pub fn simulate(&self, category: &mut TerminalCategory, rng: &mut fastrand::Rng) {
        let slots_per_carrier = category.slots_per_carrier();
        let carriers = category.carriers_number();
        if slots_per_carrier == 0 {
            return;
        }

        for tal_offset in 0..self.nb_tal {
            // distinct slot offsets within a carrier, then a random carrier
            // for each, as a terminal transmitter would pick them
            let mut offsets = std::collections::BTreeSet::new();
            while offsets.len() < usize::from(self.nb_packets_per_tal)
                && offsets.len() < slots_per_carrier as usize
            {
                offsets.insert(rng.u32(0..slots_per_carrier));
            }
            let mut time_slots = std::collections::BTreeSet::new();
            for offset in offsets {
                time_slots.insert(rng.u32(0..carriers) * slots_per_carrier + offset);
            }

            let replicas: Vec<u16> = time_slots.iter().map(|&ts| ts as u16).collect();
            if replicas.len() < usize::from(self.nb_replicas) {
                continue;
            }
            // a PDU id distinguishes the replica sets, otherwise collision
            // resolution would treat all synthetic packets as one packet
            for chunk in replicas.chunks(usize::from(self.nb_replicas)) {
                if chunk.len() < usize::from(self.nb_replicas) {
                    break;
                }
                for &ts in chunk {
                    let mut packet =
                        SaDataPacket::new(&[], u32::from(tal_offset), ts, 0, 0, self.nb_replicas, 0);
                    if let Err(err) = packet.set_replicas(chunk) {
                        log::error!("cannot record simulated replica slots: {}", err);
                        continue;
                    }
                    packet.set_src_tal_id(BROADCAST_TAL_ID + 1 + tal_offset as u8);
                    if let Some(slot) = category.slots_mut().get_mut(&ts) {
                        slot.push(packet);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmt::{FmtGroup, FmtTable, UnitConverter};
    use crate::terminal::CarrierGroup;
    use std::time::Duration;

    fn category() -> TerminalCategory {
        let mut category = TerminalCategory::new("Standard");
        category.add_carrier_group(CarrierGroup::new(1, FmtGroup::new(vec![3]), 100, 1e6, 2));
        let mut converter = UnitConverter::new(Duration::from_millis(50), 1000);
        category.compute_slots(&mut converter, &FmtTable::with_defaults());
        category
    }

    fn profile(max_packets: u16, replicas: u16, ratio: u8) -> SimulationProfile {
        SimulationProfile {
            category: "Standard".to_string(),
            nb_max_packets: max_packets,
            nb_replicas: replicas,
            ratio,
        }
    }

    #[test]
    fn sizing_follows_ratio_and_replicas() {
        let simu = SlottedAlohaSimu::new(&profile(100, 2, 50));
        assert_eq!(simu.nb_tal(), 25);
        let simu = SlottedAlohaSimu::new(&profile(10, 3, 10));
        assert_eq!(simu.nb_tal(), 1); // floors to at least one terminal
    }

    #[test]
    fn simulated_packets_use_reserved_tal_ids() {
        let mut cat = category();
        let simu = SlottedAlohaSimu::new(&profile(20, 2, 100));
        let mut rng = fastrand::Rng::with_seed(7);
        simu.simulate(&mut cat, &mut rng);
        let mut seen = 0;
        for slot in cat.slots().values() {
            for packet in slot.packets() {
                assert!(packet.src_tal_id() > BROADCAST_TAL_ID);
                seen += 1;
            }
        }
        assert!(seen > 0);
    }

    #[test]
    fn replica_slots_are_recorded_in_the_header() {
        let mut cat = category();
        let simu = SlottedAlohaSimu::new(&profile(4, 2, 100));
        let mut rng = fastrand::Rng::with_seed(3);
        simu.simulate(&mut cat, &mut rng);
        for slot in cat.slots().values() {
            for packet in slot.packets() {
                let replicas: Vec<u16> =
                    (0..packet.nb_replicas()).map(|i| packet.replica(i)).collect();
                assert!(replicas.contains(&packet.ts()));
            }
        }
    }
}
