// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSE encapsulation engine.
//!
//! PDUs enter through [`Encapsulator::receive_pdu`] and leave as one or
//! more GSE packets through repeated [`Encapsulator::next_packet`] calls,
//! each bounded by the caller's byte budget. Fragmentation state is keyed
//! by frag id; several PDUs may be queued per frag id and are drained FIFO.
//!
//! Label re-use: when enabled, up to `max_reuse` consecutive packets whose
//! PDU label equals the previously emitted one are sent with the ReUse
//! label type and no label bytes. The total-length field and the CRC are
//! always computed over the *resolved* label, so re-use is transparent to
//! reassembly.

use std::collections::{BTreeMap, VecDeque};

use crate::gse::header::{pdu_crc, write_complete, write_first, write_subsequent};
use crate::gse::{
    Label, CRC_LENGTH, FRAG_ID_LENGTH, MANDATORY_FIELDS_LENGTH, MAX_PACKET_LENGTH,
    MAX_PDU_LENGTH, PROTOCOL_TYPE_LENGTH, TOTAL_LENGTH_LENGTH,
};
use crate::{Error, Result};

/// What a PDU is wrapped with: the (possibly extension-announcing)
/// protocol type and its label.
#[derive(Debug, Clone, Copy)]
pub struct EncapMetadata {
    pub protocol_type: u16,
    pub label: Label,
}

#[derive(Debug)]
struct PendingPdu {
    pdu: Vec<u8>,
    offset: usize,
    protocol_type: u16,
    label: Label,
    total_length: u16,
    crc: u32,
    started: bool,
}

impl PendingPdu {
    fn remaining(&self) -> usize {
        self.pdu.len() - self.offset
    }
}

/// Stateful GSE encapsulator.
#[derive(Debug, Default)]
pub struct Encapsulator {
    /// Maximum consecutive ReUse labels; 0 disables re-use.
    max_reuse: u8,
    last_label: Option<Label>,
    consecutive_reuse: u8,
    pending: BTreeMap<u8, VecDeque<PendingPdu>>,
}

impl Encapsulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow up to `max_consecutive` ReUse labels after a carried label.
    pub fn enable_label_reuse(&mut self, max_consecutive: u8) {
        self.max_reuse = max_consecutive;
    }

    /// Force a carried label on every complete/first packet (compatibility
    /// mode for receivers that predate ReUse).
    pub fn disable_label_reuse(&mut self) {
        self.max_reuse = 0;
        self.consecutive_reuse = 0;
    }

    /// Queue a PDU for segmentation under `frag_id`.
    ///
    /// `pdu` must already contain any in-band extension bytes announced by
    /// `metadata.protocol_type`.
    pub fn receive_pdu(&mut self, pdu: Vec<u8>, metadata: EncapMetadata, frag_id: u8) -> Result<()> {
        let label = metadata.label;
        if matches!(label, Label::ReUse) {
            return Err(Error::Codec("a PDU cannot be queued with a re-use label".to_string()));
        }
        let total = PROTOCOL_TYPE_LENGTH + label.len() + pdu.len();
        if total > MAX_PDU_LENGTH {
            return Err(Error::PduTooLarge { max: MAX_PDU_LENGTH, actual: total });
        }
        let total_length = total as u16;
        let crc = pdu_crc(total_length, metadata.protocol_type, label, &pdu);
        self.pending.entry(frag_id).or_default().push_back(PendingPdu {
            pdu,
            offset: 0,
            protocol_type: metadata.protocol_type,
            label,
            total_length,
            crc,
            started: false,
        });
        Ok(())
    }

    /// True while PDUs queued under `frag_id` still have packets to emit.
    pub fn has_pending(&self, frag_id: u8) -> bool {
        self.pending.get(&frag_id).is_some_and(|queue| !queue.is_empty())
    }

    /// Produce the next GSE packet for `frag_id`, at most `max_length`
    /// bytes on the wire. Returns `None` once the queue is drained.
    pub fn next_packet(&mut self, frag_id: u8, max_length: usize) -> Result<Option<Vec<u8>>> {
        let budget = max_length.min(MAX_PACKET_LENGTH);
        let Some(queue) = self.pending.get_mut(&frag_id) else {
            return Ok(None);
        };
        let Some(head) = queue.front_mut() else {
            return Ok(None);
        };

        if !head.started {
            // Decide the wire label before sizing: re-use shrinks the header.
            let reuse = self.max_reuse > 0
                && self.last_label == Some(head.label)
                && self.consecutive_reuse < self.max_reuse;
            let wire_label = if reuse { Label::ReUse } else { head.label };

            let complete_header =
                MANDATORY_FIELDS_LENGTH + PROTOCOL_TYPE_LENGTH + wire_label.len();
            if complete_header + head.pdu.len() <= budget {
                let packet = write_complete(head.protocol_type, wire_label, &head.pdu);
                let done = queue.pop_front();
                debug_assert!(done.is_some());
                self.commit_label(reuse, wire_label);
                return Ok(Some(packet));
            }

            let first_header = MANDATORY_FIELDS_LENGTH
                + FRAG_ID_LENGTH
                + TOTAL_LENGTH_LENGTH
                + PROTOCOL_TYPE_LENGTH
                + wire_label.len();
            if budget <= first_header {
                return Err(Error::Codec(format!(
                    "budget {} too small for a first fragment header of {}",
                    budget, first_header
                )));
            }
            let chunk = budget - first_header;
            // A chunk covering the whole PDU would have taken the complete
            // branch: the first-fragment header is strictly larger.
            let packet = write_first(
                frag_id,
                head.total_length,
                head.protocol_type,
                wire_label,
                &head.pdu[..chunk],
            );
            head.offset = chunk;
            head.started = true;
            let reuse_committed = reuse;
            let committed_label = wire_label;
            self.commit_label(reuse_committed, committed_label);
            return Ok(Some(packet));
        }

        // Continuation of a started PDU.
        let header = MANDATORY_FIELDS_LENGTH + FRAG_ID_LENGTH;
        if budget <= header {
            return Err(Error::Codec(format!(
                "budget {} too small for a fragment header of {}",
                budget, header
            )));
        }
        let room = budget - header;
        let remaining = head.remaining();
        if room >= remaining + CRC_LENGTH {
            let packet = write_subsequent(frag_id, &head.pdu[head.offset..], Some(head.crc));
            queue.pop_front();
            return Ok(Some(packet));
        }
        let chunk = room.min(remaining);
        let packet = write_subsequent(frag_id, &head.pdu[head.offset..head.offset + chunk], None);
        head.offset += chunk;
        Ok(Some(packet))
    }

    fn commit_label(&mut self, reused: bool, wire_label: Label) {
        if reused {
            self.consecutive_reuse += 1;
        } else {
            self.last_label = Some(wire_label);
            self.consecutive_reuse = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gse::header::{parse_packet, PacketVariant};
    use crate::gse::frag_id;
    use crate::net::Protocol;

    fn metadata(src: u8, dst: u8, qos: u8) -> EncapMetadata {
        EncapMetadata {
            protocol_type: Protocol::Ipv4.id(),
            label: Label::six(src, dst, qos).unwrap(),
        }
    }

    #[test]
    fn small_pdu_is_one_complete_packet() {
        let mut encap = Encapsulator::new();
        let fid = frag_id(1, 0);
        encap.receive_pdu(vec![0xAA; 100], metadata(1, 2, 0), fid).unwrap();
        let packet = encap.next_packet(fid, MAX_PACKET_LENGTH).unwrap().unwrap();
        match parse_packet(&packet).unwrap().0 {
            PacketVariant::Complete { protocol_type, payload, .. } => {
                assert_eq!(protocol_type, Protocol::Ipv4.id());
                assert_eq!(payload, &[0xAA; 100][..]);
            }
            other => panic!("unexpected variant: {:?}", other),
        }
        assert!(encap.next_packet(fid, MAX_PACKET_LENGTH).unwrap().is_none());
    }

    #[test]
    fn large_pdu_fragments_and_ends_with_crc() {
        let mut encap = Encapsulator::new();
        let fid = frag_id(3, 2);
        let pdu: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        encap.receive_pdu(pdu.clone(), metadata(3, 4, 2), fid).unwrap();

        let mut packets = Vec::new();
        while let Some(packet) = encap.next_packet(fid, 300).unwrap() {
            assert!(packet.len() <= 300);
            packets.push(packet);
        }
        assert!(packets.len() >= 4);

        match parse_packet(&packets[0]).unwrap().0 {
            PacketVariant::First { total_length, .. } => {
                assert_eq!(usize::from(total_length), 2 + 6 + pdu.len());
            }
            other => panic!("expected first fragment, got {:?}", other),
        }
        match parse_packet(packets.last().unwrap()).unwrap().0 {
            PacketVariant::Subsequent { end, .. } => assert!(end),
            other => panic!("expected last fragment, got {:?}", other),
        }
    }

    #[test]
    fn label_reuse_caps_consecutive_packets() {
        let mut encap = Encapsulator::new();
        encap.enable_label_reuse(2);
        let fid = frag_id(1, 0);
        for _ in 0..5 {
            encap.receive_pdu(vec![1, 2, 3], metadata(1, 2, 0), fid).unwrap();
        }
        let mut types = Vec::new();
        while let Some(packet) = encap.next_packet(fid, MAX_PACKET_LENGTH).unwrap() {
            match parse_packet(&packet).unwrap().0 {
                PacketVariant::Complete { label, .. } => types.push(label.label_type()),
                other => panic!("unexpected variant: {:?}", other),
            }
        }
        use crate::gse::LabelType::{ReUse, SixBytes};
        assert_eq!(types, vec![SixBytes, ReUse, ReUse, SixBytes, ReUse]);
    }

    #[test]
    fn reuse_disabled_always_carries_label() {
        let mut encap = Encapsulator::new();
        encap.enable_label_reuse(3);
        encap.disable_label_reuse();
        let fid = frag_id(1, 0);
        for _ in 0..3 {
            encap.receive_pdu(vec![9], metadata(1, 2, 0), fid).unwrap();
        }
        while let Some(packet) = encap.next_packet(fid, MAX_PACKET_LENGTH).unwrap() {
            match parse_packet(&packet).unwrap().0 {
                PacketVariant::Complete { label, .. } => {
                    assert_eq!(label.label_type(), crate::gse::LabelType::SixBytes);
                }
                other => panic!("unexpected variant: {:?}", other),
            }
        }
    }

    #[test]
    fn label_change_resets_reuse() {
        let mut encap = Encapsulator::new();
        encap.enable_label_reuse(8);
        let fid = frag_id(1, 0);
        encap.receive_pdu(vec![1], metadata(1, 2, 0), fid).unwrap();
        encap.receive_pdu(vec![2], metadata(1, 3, 0), fid).unwrap();
        let first = encap.next_packet(fid, MAX_PACKET_LENGTH).unwrap().unwrap();
        let second = encap.next_packet(fid, MAX_PACKET_LENGTH).unwrap().unwrap();
        for packet in [&first, &second] {
            match parse_packet(packet).unwrap().0 {
                PacketVariant::Complete { label, .. } => {
                    assert_eq!(label.label_type(), crate::gse::LabelType::SixBytes);
                }
                other => panic!("unexpected variant: {:?}", other),
            }
        }
    }

    #[test]
    fn tiny_budget_is_an_error() {
        let mut encap = Encapsulator::new();
        let fid = frag_id(1, 0);
        encap.receive_pdu(vec![0; 64], metadata(1, 2, 0), fid).unwrap();
        assert!(encap.next_packet(fid, 8).is_err());
    }

    #[test]
    fn oversized_pdu_rejected() {
        let mut encap = Encapsulator::new();
        let err = encap
            .receive_pdu(vec![0; MAX_PDU_LENGTH], metadata(1, 2, 0), 0)
            .unwrap_err();
        assert!(matches!(err, Error::PduTooLarge { .. }));
    }
}
