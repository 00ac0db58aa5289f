// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Chunking port: refragmentation against a frame byte budget.
//!
//! The frame scheduler asks "given this GSE packet and the space left in
//! the physical frame, what can I take?". Three answers:
//!
//! - the whole packet fits: `data = packet, remaining = None`;
//! - a valid head fragment fits: `data = head, remaining = tail`, both
//!   proper GSE packets;
//! - not even a minimal fragment fits: `data = None, remaining = packet`,
//!   carried forward whole to the next frame.

use crate::gse::header::{
    parse_packet, pdu_crc, write_first, write_subsequent, PacketVariant,
};
use crate::gse::{
    frag_id, CRC_LENGTH, FRAG_ID_LENGTH, MANDATORY_FIELDS_LENGTH, MAX_PACKET_LENGTH,
    PROTOCOL_TYPE_LENGTH, TOTAL_LENGTH_LENGTH,
};
use crate::net::{Packet, Protocol};
use crate::{Error, Result};

/// Result of [`get_chunk`].
#[derive(Debug)]
pub struct Chunk {
    /// What fits in the current frame.
    pub data: Option<Packet>,
    /// What must wait for the next frame.
    pub remaining: Option<Packet>,
}

/// Split `packet` so that at most `remaining_length` bytes go out now.
///
/// Pure function of the packet and the budget; the packet's addressing
/// attributes are inherited by both fragments.
pub fn get_chunk(packet: Packet, remaining_length: usize) -> Result<Chunk> {
    if packet.total_length() <= remaining_length {
        return Ok(Chunk { data: Some(packet), remaining: None });
    }
    let budget = remaining_length.min(MAX_PACKET_LENGTH);
    let fid = frag_id(packet.src_tal_id(), packet.qos());

    let (head_bytes, tail_bytes) = {
        let (variant, _) = parse_packet(packet.data())
            .map_err(|err| Error::Chunking(format!("cannot parse packet to refragment: {}", err)))?;
        match variant {
            PacketVariant::Complete { protocol_type, label, payload } => {
                let header = MANDATORY_FIELDS_LENGTH
                    + FRAG_ID_LENGTH
                    + TOTAL_LENGTH_LENGTH
                    + PROTOCOL_TYPE_LENGTH
                    + label.len();
                if budget <= header {
                    // cannot build a valid first fragment in this budget
                    return Ok(Chunk { data: None, remaining: Some(packet) });
                }
                let take = budget - header;
                let total_length = (PROTOCOL_TYPE_LENGTH + label.len() + payload.len()) as u16;
                let crc = pdu_crc(total_length, protocol_type, label, payload);
                (
                    write_first(fid, total_length, protocol_type, label, &payload[..take]),
                    write_subsequent(fid, &payload[take..], Some(crc)),
                )
            }
            PacketVariant::First { frag_id, total_length, protocol_type, label, payload } => {
                let header = MANDATORY_FIELDS_LENGTH
                    + FRAG_ID_LENGTH
                    + TOTAL_LENGTH_LENGTH
                    + PROTOCOL_TYPE_LENGTH
                    + label.len();
                if budget <= header {
                    return Ok(Chunk { data: None, remaining: Some(packet) });
                }
                let take = budget - header;
                (
                    write_first(frag_id, total_length, protocol_type, label, &payload[..take]),
                    write_subsequent(frag_id, &payload[take..], None),
                )
            }
            PacketVariant::Subsequent { frag_id, end, payload } => {
                let header = MANDATORY_FIELDS_LENGTH + FRAG_ID_LENGTH;
                if budget <= header {
                    return Ok(Chunk { data: None, remaining: Some(packet) });
                }
                let room = budget - header;
                if end {
                    let (body, trailer) = payload.split_at(payload.len() - CRC_LENGTH);
                    let crc =
                        u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
                    let take = room.min(body.len());
                    (
                        write_subsequent(frag_id, &body[..take], None),
                        write_subsequent(frag_id, &body[take..], Some(crc)),
                    )
                } else {
                    let take = room.min(payload.len() - 1);
                    (
                        write_subsequent(frag_id, &payload[..take], None),
                        write_subsequent(frag_id, &payload[take..], None),
                    )
                }
            }
            PacketVariant::Padding => {
                return Err(Error::Chunking("cannot refragment padding".to_string()))
            }
        }
    };

    let data = wrap(head_bytes, &packet)?;
    let remaining = wrap(tail_bytes, &packet)?;
    Ok(Chunk { data: Some(data), remaining: Some(remaining) })
}

/// Wrap refragmented bytes, inheriting the source packet's attributes.
fn wrap(bytes: Vec<u8>, origin: &Packet) -> Result<Packet> {
    let (variant, _) = parse_packet(&bytes)
        .map_err(|err| Error::Chunking(format!("produced an invalid fragment: {}", err)))?;
    let (header_length, trailer_length) = match variant {
        PacketVariant::Complete { label, .. } => {
            (MANDATORY_FIELDS_LENGTH + PROTOCOL_TYPE_LENGTH + label.len(), 0)
        }
        PacketVariant::First { label, .. } => (
            MANDATORY_FIELDS_LENGTH
                + FRAG_ID_LENGTH
                + TOTAL_LENGTH_LENGTH
                + PROTOCOL_TYPE_LENGTH
                + label.len(),
            0,
        ),
        PacketVariant::Subsequent { end, .. } => (
            MANDATORY_FIELDS_LENGTH + FRAG_ID_LENGTH,
            if end { CRC_LENGTH } else { 0 },
        ),
        PacketVariant::Padding => {
            return Err(Error::Chunking("produced padding".to_string()))
        }
    };
    let mut packet = Packet::from_parts(
        Protocol::Gse,
        bytes,
        origin.qos(),
        origin.src_tal_id(),
        origin.dst_tal_id(),
        header_length,
        trailer_length,
    );
    packet.set_dst_spot(origin.dst_spot());
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DecapConfig, EncapConfig};
    use crate::gse::decoder::GseDecoder;
    use crate::gse::encoder::GseEncoder;
    use crate::net::Burst;

    fn one_gse_packet(payload_len: usize) -> Packet {
        let mut enc = GseEncoder::new(&EncapConfig::default());
        let upper = Packet::build(Protocol::Ipv4, &vec![0x42u8; payload_len], 2, 1, 3).unwrap();
        let (mut gse, _) = enc.encapsulate(std::iter::once(upper).collect()).unwrap();
        assert_eq!(gse.len(), 1);
        let packet = gse.drain().next().unwrap();
        packet
    }

    #[test]
    fn whole_packet_fits() {
        let packet = one_gse_packet(100);
        let total = packet.total_length();
        let chunk = get_chunk(packet, total).unwrap();
        assert!(chunk.data.is_some());
        assert!(chunk.remaining.is_none());
    }

    #[test]
    fn budget_too_small_keeps_packet_for_next_frame() {
        let packet = one_gse_packet(100);
        let chunk = get_chunk(packet, 10).unwrap();
        assert!(chunk.data.is_none());
        let kept = chunk.remaining.unwrap();
        // 100-byte PDU behind a 10-byte complete header
        assert_eq!(kept.total_length(), 110);
    }

    #[test]
    fn split_produces_head_within_budget() {
        let packet = one_gse_packet(500);
        let chunk = get_chunk(packet, 200).unwrap();
        let head = chunk.data.unwrap();
        let tail = chunk.remaining.unwrap();
        assert!(head.total_length() <= 200);
        match parse_packet(head.data()).unwrap().0 {
            PacketVariant::First { total_length, .. } => {
                assert_eq!(usize::from(total_length), 2 + 6 + 500);
            }
            other => panic!("expected a first fragment, got {:?}", other),
        }
        match parse_packet(tail.data()).unwrap().0 {
            PacketVariant::Subsequent { end, .. } => assert!(end),
            other => panic!("expected a last fragment, got {:?}", other),
        }
    }

    #[test]
    fn chunks_reassemble_to_the_original() {
        let packet = one_gse_packet(900);
        let original_payload = vec![0x42u8; 900];

        // walk an arbitrary budget sequence
        let mut dec = GseDecoder::new(&DecapConfig::default(), 3);
        let mut upper = Burst::new();
        let mut pending = Some(packet);
        for budget in [300usize, 150, 620, 400, 4000] {
            let Some(packet) = pending.take() else { break };
            let chunk = get_chunk(packet, budget).unwrap();
            if let Some(head) = chunk.data {
                upper.extend(dec.decapsulate(std::iter::once(head).collect()).unwrap());
            }
            pending = chunk.remaining;
        }
        assert!(pending.is_none());
        assert_eq!(upper.len(), 1);
        assert_eq!(upper.front().unwrap().data(), original_payload.as_slice());
    }

    #[test]
    fn refragmenting_a_tail_again_works() {
        let packet = one_gse_packet(1000);
        let first = get_chunk(packet, 300).unwrap();
        let tail = first.remaining.unwrap();
        let second = get_chunk(tail, 300).unwrap();
        assert!(second.data.is_some());
        assert!(second.remaining.is_some());

        // stitch all three through the decoder
        let mut dec = GseDecoder::new(&DecapConfig::default(), 3);
        let mut out = Burst::new();
        for packet in [
            first.data.unwrap(),
            second.data.unwrap(),
            second.remaining.unwrap(),
        ] {
            out.extend(dec.decapsulate(std::iter::once(packet).collect()).unwrap());
        }
        assert_eq!(out.len(), 1);
        assert_eq!(out.front().unwrap().total_length(), 1000);
    }

    #[test]
    fn fragments_inherit_addressing() {
        let packet = one_gse_packet(500);
        let chunk = get_chunk(packet, 200).unwrap();
        for fragment in [chunk.data.unwrap(), chunk.remaining.unwrap()] {
            assert_eq!(fragment.src_tal_id(), 1);
            assert_eq!(fragment.dst_tal_id(), 3);
            assert_eq!(fragment.qos(), 2);
        }
    }
}
