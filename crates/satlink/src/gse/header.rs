// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSE packet header codec.
//!
//! Parsing yields a [`PacketVariant`] borrowing the payload region;
//! serialisation helpers build complete packets, first fragments and
//! subsequent/last fragments with the indicator bits and length fields
//! filled in. The CRC-32 trailer of fragmented PDUs uses the DVB
//! polynomial (CRC-32/MPEG-2) over `total_length | protocol | label | pdu`.

use crc::{Crc, CRC_32_MPEG_2};

use crate::gse::{
    Label, LabelType, CRC_LENGTH, FRAG_ID_LENGTH, MANDATORY_FIELDS_LENGTH, MAX_GSE_LENGTH,
    PROTOCOL_TYPE_LENGTH, TOTAL_LENGTH_LENGTH,
};
use crate::net::Protocol;
use crate::{Error, Packet, Qos, Result, TalId, BROADCAST_TAL_ID};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// One parsed GSE packet.
#[derive(Debug, PartialEq, Eq)]
pub enum PacketVariant<'a> {
    /// Two zero bytes where a header was expected: end-of-frame padding.
    Padding,
    /// `S=1, E=1` - a whole PDU in one packet.
    Complete { protocol_type: u16, label: Label, payload: &'a [u8] },
    /// `S=1, E=0` - first fragment of a PDU.
    First {
        frag_id: u8,
        total_length: u16,
        protocol_type: u16,
        label: Label,
        payload: &'a [u8],
    },
    /// `S=0` - subsequent fragment; when `end` is set the last [`CRC_LENGTH`]
    /// payload bytes are the PDU CRC-32.
    Subsequent { frag_id: u8, end: bool, payload: &'a [u8] },
}

/// On-wire length of the GSE packet at the head of `data`.
pub fn packet_length(data: &[u8]) -> Result<usize> {
    if data.len() < MANDATORY_FIELDS_LENGTH {
        return Err(Error::Malformed(format!(
            "{} bytes left, GSE mandatory header needs {}",
            data.len(),
            MANDATORY_FIELDS_LENGTH
        )));
    }
    let mandatory = u16::from_be_bytes([data[0], data[1]]);
    Ok(MANDATORY_FIELDS_LENGTH + usize::from(mandatory & 0x0FFF))
}

/// Parse the GSE packet at the head of `data`.
///
/// Returns the variant and the number of bytes consumed (the whole of
/// `data` for padding).
pub fn parse_packet(data: &[u8]) -> Result<(PacketVariant<'_>, usize)> {
    if data.len() < MANDATORY_FIELDS_LENGTH {
        return Err(Error::Malformed(format!(
            "{} bytes left, GSE mandatory header needs {}",
            data.len(),
            MANDATORY_FIELDS_LENGTH
        )));
    }
    let mandatory = u16::from_be_bytes([data[0], data[1]]);
    if mandatory == 0 {
        return Ok((PacketVariant::Padding, data.len()));
    }

    let start = mandatory & 0x8000 != 0;
    let end = mandatory & 0x4000 != 0;
    let label_type = LabelType::from_bits(mandatory >> 12);
    let gse_length = usize::from(mandatory & 0x0FFF);
    let total = MANDATORY_FIELDS_LENGTH + gse_length;
    if data.len() < total {
        return Err(Error::Malformed(format!(
            "GSE length field says {} bytes, buffer holds {}",
            total,
            data.len()
        )));
    }
    let body = &data[MANDATORY_FIELDS_LENGTH..total];

    let variant = match (start, end) {
        (true, true) => {
            let min = PROTOCOL_TYPE_LENGTH + label_type.label_length();
            if body.len() < min {
                return Err(Error::Malformed(format!(
                    "complete packet body {} shorter than header {}",
                    body.len(),
                    min
                )));
            }
            let protocol_type = u16::from_be_bytes([body[0], body[1]]);
            let label = Label::read(label_type, &body[PROTOCOL_TYPE_LENGTH..])?;
            PacketVariant::Complete {
                protocol_type,
                label,
                payload: &body[PROTOCOL_TYPE_LENGTH + label.len()..],
            }
        }
        (true, false) => {
            let min = FRAG_ID_LENGTH
                + TOTAL_LENGTH_LENGTH
                + PROTOCOL_TYPE_LENGTH
                + label_type.label_length();
            if body.len() < min {
                return Err(Error::Malformed(format!(
                    "first fragment body {} shorter than header {}",
                    body.len(),
                    min
                )));
            }
            let frag_id = body[0];
            let total_length = u16::from_be_bytes([body[1], body[2]]);
            let protocol_type = u16::from_be_bytes([body[3], body[4]]);
            let label = Label::read(label_type, &body[5..])?;
            PacketVariant::First {
                frag_id,
                total_length,
                protocol_type,
                label,
                payload: &body[5 + label.len()..],
            }
        }
        (false, end) => {
            if body.is_empty() {
                return Err(Error::Malformed("fragment without a frag id".to_string()));
            }
            let payload = &body[FRAG_ID_LENGTH..];
            if end && payload.len() < CRC_LENGTH {
                return Err(Error::Malformed(format!(
                    "last fragment payload {} shorter than the CRC trailer",
                    payload.len()
                )));
            }
            PacketVariant::Subsequent { frag_id: body[0], end, payload }
        }
    };
    Ok((variant, total))
}

fn write_mandatory(out: &mut Vec<u8>, start: bool, end: bool, label_type: LabelType, body: usize) {
    debug_assert!(body <= MAX_GSE_LENGTH);
    let mut mandatory = (body as u16) & 0x0FFF;
    mandatory |= label_type.bits() << 12;
    if end {
        mandatory |= 0x4000;
    }
    if start {
        mandatory |= 0x8000;
    }
    out.extend_from_slice(&mandatory.to_be_bytes());
}

/// Serialise a complete GSE packet.
pub fn write_complete(protocol_type: u16, label: Label, payload: &[u8]) -> Vec<u8> {
    let body = PROTOCOL_TYPE_LENGTH + label.len() + payload.len();
    let mut out = Vec::with_capacity(MANDATORY_FIELDS_LENGTH + body);
    write_mandatory(&mut out, true, true, label.label_type(), body);
    out.extend_from_slice(&protocol_type.to_be_bytes());
    out.extend_from_slice(label.bytes());
    out.extend_from_slice(payload);
    out
}

/// Serialise a first fragment.
pub fn write_first(
    frag_id: u8,
    total_length: u16,
    protocol_type: u16,
    label: Label,
    payload: &[u8],
) -> Vec<u8> {
    let body = FRAG_ID_LENGTH
        + TOTAL_LENGTH_LENGTH
        + PROTOCOL_TYPE_LENGTH
        + label.len()
        + payload.len();
    let mut out = Vec::with_capacity(MANDATORY_FIELDS_LENGTH + body);
    write_mandatory(&mut out, true, false, label.label_type(), body);
    out.push(frag_id);
    out.extend_from_slice(&total_length.to_be_bytes());
    out.extend_from_slice(&protocol_type.to_be_bytes());
    out.extend_from_slice(label.bytes());
    out.extend_from_slice(payload);
    out
}

/// Serialise a subsequent fragment; `crc` makes it the last fragment.
pub fn write_subsequent(frag_id: u8, payload: &[u8], crc: Option<u32>) -> Vec<u8> {
    let body = FRAG_ID_LENGTH + payload.len() + if crc.is_some() { CRC_LENGTH } else { 0 };
    let mut out = Vec::with_capacity(MANDATORY_FIELDS_LENGTH + body);
    // LT is meaningless without a start indicator; the re-use pattern is
    // what the wire carries there.
    write_mandatory(&mut out, false, crc.is_some(), LabelType::ReUse, body);
    out.push(frag_id);
    out.extend_from_slice(payload);
    if let Some(crc) = crc {
        out.extend_from_slice(&crc.to_be_bytes());
    }
    out
}

/// CRC-32 of a fragmented PDU: `total_length | protocol | label | pdu`.
pub fn pdu_crc(total_length: u16, protocol_type: u16, label: Label, pdu: &[u8]) -> u32 {
    let mut digest = CRC32.digest();
    digest.update(&total_length.to_be_bytes());
    digest.update(&protocol_type.to_be_bytes());
    digest.update(label.bytes());
    digest.update(pdu);
    digest.finalize()
}

/// Addressing triple of a raw GSE packet.
///
/// Complete packets and first fragments read the label; subsequent
/// fragments read the frag id, whose destination is not recoverable and
/// resolves to broadcast. ReUse labels carry no addressing and are
/// rejected — the stateful decoder is the only place they resolve.
pub fn packet_addressing(data: &[u8]) -> Result<(TalId, TalId, Qos)> {
    let (variant, _) = parse_packet(data)?;
    match variant {
        PacketVariant::Complete { label, .. } | PacketVariant::First { label, .. } => label
            .addressing()
            .ok_or_else(|| Error::Malformed("re-use label carries no addressing".to_string())),
        PacketVariant::Subsequent { frag_id, .. } => Ok((
            super::src_tal_id_from_frag_id(frag_id),
            BROADCAST_TAL_ID,
            super::qos_from_frag_id(frag_id),
        )),
        PacketVariant::Padding => Err(Error::Malformed("padding is not a packet".to_string())),
    }
}

/// Wrap raw GSE bytes into the packet model, with the header length of the
/// variant actually present.
pub fn build_packet(data: &[u8]) -> Result<Packet> {
    let (variant, consumed) = parse_packet(data)?;
    let (src, dst, qos, header_length, trailer) = match variant {
        PacketVariant::Complete { label, .. } => {
            let (src, dst, qos) = label
                .addressing()
                .ok_or_else(|| Error::Malformed("re-use label carries no addressing".to_string()))?;
            (src, dst, qos, MANDATORY_FIELDS_LENGTH + PROTOCOL_TYPE_LENGTH + label.len(), 0)
        }
        PacketVariant::First { label, .. } => {
            let (src, dst, qos) = label
                .addressing()
                .ok_or_else(|| Error::Malformed("re-use label carries no addressing".to_string()))?;
            (
                src,
                dst,
                qos,
                MANDATORY_FIELDS_LENGTH
                    + FRAG_ID_LENGTH
                    + TOTAL_LENGTH_LENGTH
                    + PROTOCOL_TYPE_LENGTH
                    + label.len(),
                0,
            )
        }
        PacketVariant::Subsequent { frag_id, end, .. } => (
            super::src_tal_id_from_frag_id(frag_id),
            BROADCAST_TAL_ID,
            super::qos_from_frag_id(frag_id),
            MANDATORY_FIELDS_LENGTH + FRAG_ID_LENGTH,
            if end { CRC_LENGTH } else { 0 },
        ),
        PacketVariant::Padding => {
            return Err(Error::Malformed("padding is not a packet".to_string()))
        }
    };
    Ok(Packet::from_parts(
        Protocol::Gse,
        data[..consumed].to_vec(),
        qos,
        src,
        dst,
        header_length,
        trailer,
    ))
}
