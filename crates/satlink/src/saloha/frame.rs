// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Slotted-ALOHA frames: fixed-capacity containers of whole SA packets.

use crate::saloha::{SaCtrlPacket, SaDataPacket};
use crate::{Result, SpotId};

/// Payload capacity of one Slotted-ALOHA frame (DVB-RCS message bound).
pub const MAX_FRAME_PAYLOAD: usize = 1200;

/// Whether a frame carries data packets or control packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaFrameKind {
    Data,
    Ctrl,
}

/// One Slotted-ALOHA frame.
#[derive(Debug, Clone)]
pub struct SaFrame {
    kind: SaFrameKind,
    spot_id: SpotId,
    payload: Vec<u8>,
    packet_count: u16,
}

impl SaFrame {
    pub fn new(kind: SaFrameKind) -> Self {
        Self { kind, spot_id: 0, payload: Vec::new(), packet_count: 0 }
    }

    pub fn kind(&self) -> SaFrameKind {
        self.kind
    }

    pub fn spot_id(&self) -> SpotId {
        self.spot_id
    }

    pub fn set_spot_id(&mut self, spot_id: SpotId) {
        self.spot_id = spot_id;
    }

    pub fn free_space(&self) -> usize {
        MAX_FRAME_PAYLOAD - self.payload.len()
    }

    pub fn packet_count(&self) -> u16 {
        self.packet_count
    }

    pub fn is_empty(&self) -> bool {
        self.packet_count == 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Append a data packet; `false` when it does not fit.
    pub fn add_data_packet(&mut self, packet: &SaDataPacket) -> bool {
        if self.free_space() < packet.total_length() {
            return false;
        }
        self.payload.extend_from_slice(packet.data());
        self.packet_count += 1;
        true
    }

    /// Append a control packet; `false` when it does not fit.
    pub fn add_ctrl_packet(&mut self, packet: &SaCtrlPacket) -> bool {
        if self.free_space() < packet.total_length() {
            return false;
        }
        self.payload.extend_from_slice(packet.data());
        self.packet_count += 1;
        true
    }

    /// Parse back the data packets of a data frame.
    pub fn data_packets(&self) -> Result<Vec<SaDataPacket>> {
        let mut packets = Vec::with_capacity(usize::from(self.packet_count));
        let mut offset = 0;
        while offset < self.payload.len() {
            let packet = SaDataPacket::parse(&self.payload[offset..])?;
            offset += packet.total_length();
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Parse back the control packets of a control frame.
    pub fn ctrl_packets(&self) -> Result<Vec<SaCtrlPacket>> {
        let mut packets = Vec::with_capacity(usize::from(self.packet_count));
        let mut offset = 0;
        while offset < self.payload.len() {
            let packet = SaCtrlPacket::parse(&self.payload[offset..])?;
            offset += packet.total_length();
            packets.push(packet);
        }
        Ok(packets)
    }

    /// Rebuild a frame from raw payload bytes received off the wire.
    pub fn from_payload(kind: SaFrameKind, payload: Vec<u8>) -> Result<Self> {
        let mut frame = Self { kind, spot_id: 0, payload, packet_count: 0 };
        frame.packet_count = match kind {
            SaFrameKind::Data => frame.data_packets()?.len() as u16,
            SaFrameKind::Ctrl => frame.ctrl_packets()?.len() as u16,
        };
        Ok(frame)
    }
}
