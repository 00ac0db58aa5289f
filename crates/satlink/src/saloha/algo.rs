// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Collision resolution over a slot inventory.
//!
//! Both algorithms consume the slot contents, append the survivors to the
//! accepted vector and return the number of packets lost to collisions
//! (the sum of the sizes of slots still in collision at the end). A unique
//! id is accepted at most once per terminal, which also deduplicates
//! replicas and retransmissions.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::CollisionAlgorithm;
use crate::saloha::{SaDataPacket, UniqueId};
use crate::terminal::Slot;
use crate::TalId;

/// Resolve collisions with the configured algorithm.
pub fn remove_collisions(
    algorithm: CollisionAlgorithm,
    slots: &mut BTreeMap<u16, Slot>,
    accepted: &mut Vec<SaDataPacket>,
) -> u16 {
    match algorithm {
        CollisionAlgorithm::Dsa => dsa(slots, accepted),
        CollisionAlgorithm::Crdsa => crdsa(slots, accepted),
    }
}

type AcceptedIds = BTreeMap<TalId, BTreeSet<UniqueId>>;

fn already_accepted(ids: &AcceptedIds, tal_id: TalId, unique_id: UniqueId) -> bool {
    ids.get(&tal_id).is_some_and(|set| set.contains(&unique_id))
}

fn record(ids: &mut AcceptedIds, tal_id: TalId, unique_id: UniqueId) {
    ids.entry(tal_id).or_default().insert(unique_id);
}

/// Diversity Slotted ALOHA: a slot with exactly one replica is decoded,
/// anything else is lost.
fn dsa(slots: &mut BTreeMap<u16, Slot>, accepted: &mut Vec<SaDataPacket>) -> u16 {
    let mut accepted_ids = AcceptedIds::new();
    let mut nbr_collisions = 0u16;

    for slot in slots.values_mut() {
        match slot.len() {
            0 => continue,
            1 => {
                let packet = slot.take_packets().into_iter().next();
                let Some(packet) = packet else { continue };
                let tal_id = packet.src_tal_id();
                let unique_id = packet.unique_id();
                if already_accepted(&accepted_ids, tal_id, unique_id) {
                    // another replica of this packet already got through
                    log::debug!("replica {} from terminal {} already decoded", unique_id, tal_id);
                } else {
                    record(&mut accepted_ids, tal_id, unique_id);
                    log::debug!("no collision on slot {}, keep terminal {}", slot.id(), tal_id);
                    accepted.push(packet);
                }
            }
            size => {
                log::info!("collision on slot {}, {} packets lost", slot.id(), size);
                nbr_collisions += size as u16;
                slot.clear();
            }
        }
    }
    nbr_collisions
}

/// Contention-Resolution Diversity Slotted ALOHA: iterative signal
/// suppression. Decoding a replica removes its twins from other slots,
/// which can free those slots on the next pass; iterate until a full pass
/// decodes nothing new.
fn crdsa(slots: &mut BTreeMap<u16, Slot>, accepted: &mut Vec<SaDataPacket>) -> u16 {
    let mut accepted_ids = AcceptedIds::new();
    let mut nbr_collisions = 0u16;

    loop {
        let mut progressed = false;
        for slot in slots.values_mut() {
            if slot.is_empty() {
                continue;
            }
            // suppress replicas whose unique id was accepted elsewhere
            slot.packets_mut().retain(|packet| {
                !already_accepted(&accepted_ids, packet.src_tal_id(), packet.unique_id())
            });
            if slot.len() == 1 {
                let Some(packet) = slot.take_packets().into_iter().next() else {
                    continue;
                };
                record(&mut accepted_ids, packet.src_tal_id(), packet.unique_id());
                log::debug!(
                    "slot {} decodable after suppression, keep terminal {}",
                    slot.id(),
                    packet.src_tal_id()
                );
                accepted.push(packet);
                // restart the sweep: this acceptance may free other slots
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    for slot in slots.values_mut() {
        if slot.len() > 1 {
            log::info!("unresolved collision on slot {}, {} packets lost", slot.id(), slot.len());
            nbr_collisions += slot.len() as u16;
        }
        slot.clear();
    }
    nbr_collisions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pdu_id: u32, seq: u16, src: TalId, ts: u16, nb_replicas: u16) -> SaDataPacket {
        let mut packet = SaDataPacket::new(b"", pdu_id, ts, seq, 1, nb_replicas, 0);
        packet.set_src_tal_id(src);
        packet
    }

    fn slots(n: u16) -> BTreeMap<u16, Slot> {
        (0..n).map(|id| (id, Slot::new(0, id))).collect()
    }

    #[test]
    fn dsa_accepts_single_replica() {
        let mut inventory = slots(16);
        inventory.get_mut(&7).unwrap().push(packet(42, 0, 5, 7, 1));

        let mut accepted = Vec::new();
        let collisions = remove_collisions(CollisionAlgorithm::Dsa, &mut inventory, &mut accepted);
        assert_eq!(collisions, 0);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].pdu_id(), 42);
        assert!(inventory.values().all(Slot::is_empty));
    }

    #[test]
    fn dsa_counts_collisions_and_clears() {
        let mut inventory = slots(4);
        inventory.get_mut(&1).unwrap().push(packet(1, 0, 2, 1, 1));
        inventory.get_mut(&1).unwrap().push(packet(2, 0, 3, 1, 1));

        let mut accepted = Vec::new();
        let collisions = remove_collisions(CollisionAlgorithm::Dsa, &mut inventory, &mut accepted);
        assert_eq!(collisions, 2);
        assert!(accepted.is_empty());
        assert!(inventory.values().all(Slot::is_empty));
    }

    #[test]
    fn dsa_deduplicates_replicas_of_the_same_packet() {
        let mut inventory = slots(8);
        inventory.get_mut(&2).unwrap().push(packet(9, 0, 4, 2, 2));
        inventory.get_mut(&5).unwrap().push(packet(9, 0, 4, 5, 2));

        let mut accepted = Vec::new();
        let collisions = remove_collisions(CollisionAlgorithm::Dsa, &mut inventory, &mut accepted);
        assert_eq!(collisions, 0);
        assert_eq!(accepted.len(), 1);
    }

    #[test]
    fn dsa_is_idempotent_on_cleared_slots() {
        let mut inventory = slots(8);
        inventory.get_mut(&2).unwrap().push(packet(9, 0, 4, 2, 1));
        let mut first = Vec::new();
        remove_collisions(CollisionAlgorithm::Dsa, &mut inventory, &mut first);
        let mut second = Vec::new();
        let collisions =
            remove_collisions(CollisionAlgorithm::Dsa, &mut inventory, &mut second);
        assert_eq!(collisions, 0);
        assert!(second.is_empty());
    }

    #[test]
    fn crdsa_resolves_two_replica_contention() {
        // slot 3: replica of (7,0) from src 4 + a packet from src 9
        // slot 11: the other replica of (7,0)
        let mut inventory = slots(16);
        inventory.get_mut(&3).unwrap().push(packet(7, 0, 4, 3, 2));
        inventory.get_mut(&3).unwrap().push(packet(50, 0, 9, 3, 2));
        inventory.get_mut(&11).unwrap().push(packet(7, 0, 4, 11, 2));

        let mut accepted = Vec::new();
        let collisions =
            remove_collisions(CollisionAlgorithm::Crdsa, &mut inventory, &mut accepted);
        assert_eq!(collisions, 0);
        let mut sources: Vec<TalId> = accepted.iter().map(SaDataPacket::src_tal_id).collect();
        sources.sort_unstable();
        assert_eq!(sources, vec![4, 9]);
    }

    #[test]
    fn crdsa_accepts_at_least_as_much_as_dsa() {
        let build = || {
            let mut inventory = slots(16);
            inventory.get_mut(&3).unwrap().push(packet(7, 0, 4, 3, 2));
            inventory.get_mut(&3).unwrap().push(packet(50, 0, 9, 3, 2));
            inventory.get_mut(&11).unwrap().push(packet(7, 0, 4, 11, 2));
            inventory.get_mut(&12).unwrap().push(packet(60, 0, 2, 12, 1));
            inventory
        };

        let mut dsa_accepted = Vec::new();
        remove_collisions(CollisionAlgorithm::Dsa, &mut build(), &mut dsa_accepted);
        let mut crdsa_accepted = Vec::new();
        remove_collisions(CollisionAlgorithm::Crdsa, &mut build(), &mut crdsa_accepted);
        assert!(crdsa_accepted.len() >= dsa_accepted.len());
    }

    #[test]
    fn crdsa_leaves_true_collisions_counted() {
        // two different packets on one slot, no replicas elsewhere
        let mut inventory = slots(4);
        inventory.get_mut(&0).unwrap().push(packet(1, 0, 2, 0, 1));
        inventory.get_mut(&0).unwrap().push(packet(2, 0, 3, 0, 1));

        let mut accepted = Vec::new();
        let collisions =
            remove_collisions(CollisionAlgorithm::Crdsa, &mut inventory, &mut accepted);
        assert_eq!(collisions, 2);
        assert!(accepted.is_empty());
    }
}
