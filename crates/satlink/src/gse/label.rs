// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSE labels.
//!
//! The encoder emits six-byte labels carrying `[src, dst, qos, 0, 0, 0]`
//! (three-byte labels carry the same triple without padding). Broadcast and
//! ReUse label types occupy no bytes on the wire; ReUse means "same label
//! as the previous packet on this receiver".

use crate::{Error, Qos, Result, TalId, BROADCAST_TAL_ID};

/// The two LT bits of the mandatory GSE header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelType {
    /// `00` - six-byte label.
    SixBytes,
    /// `01` - three-byte label.
    ThreeBytes,
    /// `10` - broadcast, no label bytes.
    Broadcast,
    /// `11` - label re-use, no label bytes.
    ReUse,
}

impl LabelType {
    pub fn bits(self) -> u16 {
        match self {
            LabelType::SixBytes => 0b00,
            LabelType::ThreeBytes => 0b01,
            LabelType::Broadcast => 0b10,
            LabelType::ReUse => 0b11,
        }
    }

    pub fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => LabelType::SixBytes,
            0b01 => LabelType::ThreeBytes,
            0b10 => LabelType::Broadcast,
            _ => LabelType::ReUse,
        }
    }

    /// On-wire label length for this type.
    pub fn label_length(self) -> usize {
        match self {
            LabelType::SixBytes => 6,
            LabelType::ThreeBytes => 3,
            LabelType::Broadcast | LabelType::ReUse => 0,
        }
    }
}

/// A GSE label value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Six([u8; 6]),
    Three([u8; 3]),
    Broadcast,
    ReUse,
}

impl Label {
    /// Six-byte label from an addressing triple.
    pub fn six(src_tal_id: TalId, dst_tal_id: TalId, qos: Qos) -> Result<Self> {
        check_triple(src_tal_id, dst_tal_id, qos)?;
        Ok(Label::Six([src_tal_id, dst_tal_id, qos, 0, 0, 0]))
    }

    /// Three-byte label from an addressing triple.
    pub fn three(src_tal_id: TalId, dst_tal_id: TalId, qos: Qos) -> Result<Self> {
        check_triple(src_tal_id, dst_tal_id, qos)?;
        Ok(Label::Three([src_tal_id, dst_tal_id, qos]))
    }

    pub fn label_type(self) -> LabelType {
        match self {
            Label::Six(_) => LabelType::SixBytes,
            Label::Three(_) => LabelType::ThreeBytes,
            Label::Broadcast => LabelType::Broadcast,
            Label::ReUse => LabelType::ReUse,
        }
    }

    /// On-wire bytes of the label (empty for broadcast/reuse).
    pub fn bytes(&self) -> &[u8] {
        match self {
            Label::Six(bytes) => bytes,
            Label::Three(bytes) => bytes,
            Label::Broadcast | Label::ReUse => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    /// Read a label of the given type from the head of `data`.
    pub fn read(label_type: LabelType, data: &[u8]) -> Result<Self> {
        let needed = label_type.label_length();
        if data.len() < needed {
            return Err(Error::Malformed(format!(
                "label truncated: {} bytes for a {}-byte label",
                data.len(),
                needed
            )));
        }
        Ok(match label_type {
            LabelType::SixBytes => {
                let mut bytes = [0u8; 6];
                bytes.copy_from_slice(&data[..6]);
                Label::Six(bytes)
            }
            LabelType::ThreeBytes => {
                let mut bytes = [0u8; 3];
                bytes.copy_from_slice(&data[..3]);
                Label::Three(bytes)
            }
            LabelType::Broadcast => Label::Broadcast,
            LabelType::ReUse => Label::ReUse,
        })
    }

    /// Addressing triple carried by the label, if it carries one.
    ///
    /// Broadcast labels resolve to `(31, 31, 0)`; ReUse resolves to nothing
    /// (the caller must consult its last-label cache).
    pub fn addressing(&self) -> Option<(TalId, TalId, Qos)> {
        match self {
            Label::Six(bytes) => Some((bytes[0] & 0x1F, bytes[1] & 0x1F, bytes[2] & 0x07)),
            Label::Three(bytes) => Some((bytes[0] & 0x1F, bytes[1] & 0x1F, bytes[2] & 0x07)),
            Label::Broadcast => Some((BROADCAST_TAL_ID, BROADCAST_TAL_ID, 0)),
            Label::ReUse => None,
        }
    }
}

fn check_triple(src_tal_id: TalId, dst_tal_id: TalId, qos: Qos) -> Result<()> {
    if src_tal_id & 0x1F != src_tal_id || dst_tal_id & 0x1F != dst_tal_id || qos & 0x07 != qos {
        return Err(Error::Malformed(format!(
            "addressing does not fit a label: src {} dst {} qos {}",
            src_tal_id, dst_tal_id, qos
        )));
    }
    Ok(())
}
