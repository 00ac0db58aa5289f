// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Slotted-ALOHA packet wire formats (network byte order).
//!
//! Data packet:
//!
//! ```text
//! pdu_id       : u32
//! ts           : u16     // time slot
//! seq          : u16     // sequence within the PDU
//! pdu_nb       : u16     // packets in the PDU
//! nb_replicas  : u16
//! qos          : u8
//! total_length : u16
//! replicas     : u16[nb_replicas]   // ts of each replica
//! payload      : bytes
//! ```
//!
//! Control packet:
//!
//! ```text
//! type         : u8      // 0 = ERR, 1 = ACK
//! total_length : u16
//! dst_tal_id   : u16
//! payload      : bytes   // unique id of the packet being acknowledged
//! ```

use crate::saloha::{PduId, UniqueId};
use crate::{Error, Qos, Result, TalId, BROADCAST_TAL_ID};

/// Fixed part of the data-packet header (replicas array excluded).
pub const DATA_HEADER_LENGTH: usize = 15;
/// Control-packet header length.
pub const CTRL_HEADER_LENGTH: usize = 5;

/// Control type: error report.
pub const CTRL_ERR: u8 = 0;
/// Control type: acknowledgement.
pub const CTRL_ACK: u8 = 1;

/// A Slotted-ALOHA data packet (one replica of one PDU fragment).
#[derive(Debug, Clone)]
pub struct SaDataPacket {
    data: Vec<u8>,
    /// Remaining lifetime in Slotted-ALOHA frames (transmit side).
    timeout_saf: u16,
    nb_retransmissions: u16,
    /// Source terminal, recovered from the inner packet on receive.
    src_tal_id: TalId,
}

impl SaDataPacket {
    /// Build a data packet around `payload`.
    #[allow(clippy::too_many_arguments)] // wire header fields
    pub fn new(
        payload: &[u8],
        pdu_id: PduId,
        ts: u16,
        seq: u16,
        pdu_nb: u16,
        nb_replicas: u16,
        timeout_saf: u16,
    ) -> Self {
        let header_length = DATA_HEADER_LENGTH + usize::from(nb_replicas) * 2;
        let total = header_length + payload.len();
        let mut data = Vec::with_capacity(total);
        data.extend_from_slice(&pdu_id.to_be_bytes());
        data.extend_from_slice(&ts.to_be_bytes());
        data.extend_from_slice(&seq.to_be_bytes());
        data.extend_from_slice(&pdu_nb.to_be_bytes());
        data.extend_from_slice(&nb_replicas.to_be_bytes());
        data.push(0); // qos
        data.extend_from_slice(&(total as u16).to_be_bytes());
        data.resize(header_length, 0); // replica slots, filled later
        data.extend_from_slice(payload);
        Self { data, timeout_saf, nb_retransmissions: 0, src_tal_id: BROADCAST_TAL_ID }
    }

    /// Parse a data packet from the head of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let total = Self::packet_length(data)?;
        if data.len() < total {
            return Err(Error::Malformed(format!(
                "data packet says {} bytes, buffer holds {}",
                total,
                data.len()
            )));
        }
        let packet = Self {
            data: data[..total].to_vec(),
            timeout_saf: 0,
            nb_retransmissions: 0,
            src_tal_id: BROADCAST_TAL_ID,
        };
        let header = DATA_HEADER_LENGTH + packet.replicas_length();
        if total < header {
            return Err(Error::Malformed(format!(
                "data packet of {} bytes cannot hold its {}-byte header",
                total, header
            )));
        }
        Ok(packet)
    }

    /// Total length read from a raw buffer, for container walking.
    pub fn packet_length(data: &[u8]) -> Result<usize> {
        if data.len() < DATA_HEADER_LENGTH {
            return Err(Error::Malformed(format!(
                "{} bytes left, data-packet header needs {}",
                data.len(),
                DATA_HEADER_LENGTH
            )));
        }
        let total = usize::from(u16::from_be_bytes([data[13], data[14]]));
        if total < DATA_HEADER_LENGTH {
            return Err(Error::Malformed(format!(
                "data packet total length {} below header size",
                total
            )));
        }
        Ok(total)
    }

    pub fn pdu_id(&self) -> PduId {
        u32::from_be_bytes([self.data[0], self.data[1], self.data[2], self.data[3]])
    }

    pub fn ts(&self) -> u16 {
        u16::from_be_bytes([self.data[4], self.data[5]])
    }

    pub fn seq(&self) -> u16 {
        u16::from_be_bytes([self.data[6], self.data[7]])
    }

    pub fn pdu_nb(&self) -> u16 {
        u16::from_be_bytes([self.data[8], self.data[9]])
    }

    pub fn nb_replicas(&self) -> u16 {
        u16::from_be_bytes([self.data[10], self.data[11]])
    }

    pub fn qos(&self) -> Qos {
        self.data[12]
    }

    pub fn total_length(&self) -> usize {
        usize::from(u16::from_be_bytes([self.data[13], self.data[14]]))
    }

    fn replicas_length(&self) -> usize {
        usize::from(self.nb_replicas()) * 2
    }

    /// Slot of the `pos`-th replica (0 when out of range).
    pub fn replica(&self, pos: u16) -> u16 {
        if pos >= self.nb_replicas() {
            return 0;
        }
        let offset = DATA_HEADER_LENGTH + usize::from(pos) * 2;
        u16::from_be_bytes([self.data[offset], self.data[offset + 1]])
    }

    /// Write the replica slot array; `replicas` must match `nb_replicas`.
    pub fn set_replicas(&mut self, replicas: &[u16]) -> Result<()> {
        if replicas.len() != usize::from(self.nb_replicas()) {
            return Err(Error::Malformed(format!(
                "{} replica slots for a packet declaring {}",
                replicas.len(),
                self.nb_replicas()
            )));
        }
        for (pos, ts) in replicas.iter().enumerate() {
            let offset = DATA_HEADER_LENGTH + pos * 2;
            self.data[offset..offset + 2].copy_from_slice(&ts.to_be_bytes());
        }
        Ok(())
    }

    pub fn set_ts(&mut self, ts: u16) {
        self.data[4..6].copy_from_slice(&ts.to_be_bytes());
    }

    pub fn set_qos(&mut self, qos: Qos) {
        self.data[12] = qos;
    }

    pub fn src_tal_id(&self) -> TalId {
        self.src_tal_id
    }

    pub fn set_src_tal_id(&mut self, tal_id: TalId) {
        self.src_tal_id = tal_id;
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[DATA_HEADER_LENGTH + self.replicas_length()..]
    }

    pub fn payload_length(&self) -> usize {
        self.total_length() - DATA_HEADER_LENGTH - self.replicas_length()
    }

    /// Full wire bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn unique_id(&self) -> UniqueId {
        UniqueId {
            pdu_id: self.pdu_id(),
            seq: self.seq(),
            pdu_nb: self.pdu_nb(),
            qos: self.qos(),
        }
    }

    // -- transmit-side bookkeeping (not on the wire) --

    pub fn is_timed_out(&self) -> bool {
        self.timeout_saf == 0
    }

    pub fn set_timeout(&mut self, timeout_saf: u16) {
        self.timeout_saf = timeout_saf;
    }

    pub fn dec_timeout(&mut self) {
        self.timeout_saf = self.timeout_saf.saturating_sub(1);
    }

    pub fn can_be_retransmitted(&self, max_retransmissions: u16) -> bool {
        self.nb_retransmissions < max_retransmissions
    }

    pub fn inc_retransmissions(&mut self) {
        self.nb_retransmissions += 1;
    }
}

/// A Slotted-ALOHA control packet (ACK/ERR).
#[derive(Debug, Clone)]
pub struct SaCtrlPacket {
    data: Vec<u8>,
}

impl SaCtrlPacket {
    pub fn new(ctrl_type: u8, dst_tal_id: TalId, payload: &[u8]) -> Self {
        let total = CTRL_HEADER_LENGTH + payload.len();
        let mut data = Vec::with_capacity(total);
        data.push(ctrl_type);
        data.extend_from_slice(&(total as u16).to_be_bytes());
        data.extend_from_slice(&u16::from(dst_tal_id).to_be_bytes());
        data.extend_from_slice(payload);
        Self { data }
    }

    /// Acknowledge the data packet with this unique id.
    pub fn ack(unique_id: UniqueId, dst_tal_id: TalId) -> Self {
        Self::new(CTRL_ACK, dst_tal_id, unique_id.to_string().as_bytes())
    }

    /// Parse a control packet from the head of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let total = Self::packet_length(data)?;
        if data.len() < total {
            return Err(Error::Malformed(format!(
                "control packet says {} bytes, buffer holds {}",
                total,
                data.len()
            )));
        }
        Ok(Self { data: data[..total].to_vec() })
    }

    pub fn packet_length(data: &[u8]) -> Result<usize> {
        if data.len() < CTRL_HEADER_LENGTH {
            return Err(Error::Malformed(format!(
                "{} bytes left, control-packet header needs {}",
                data.len(),
                CTRL_HEADER_LENGTH
            )));
        }
        let total = usize::from(u16::from_be_bytes([data[1], data[2]]));
        if total < CTRL_HEADER_LENGTH {
            return Err(Error::Malformed(format!(
                "control packet total length {} below header size",
                total
            )));
        }
        Ok(total)
    }

    pub fn ctrl_type(&self) -> u8 {
        self.data[0]
    }

    pub fn total_length(&self) -> usize {
        usize::from(u16::from_be_bytes([self.data[1], self.data[2]]))
    }

    pub fn dst_tal_id(&self) -> TalId {
        u16::from_be_bytes([self.data[3], self.data[4]]) as TalId
    }

    /// The unique id carried in the payload.
    pub fn unique_id(&self) -> Result<UniqueId> {
        let text = std::str::from_utf8(&self.data[CTRL_HEADER_LENGTH..])
            .map_err(|_| Error::Malformed("control payload is not text".to_string()))?;
        text.parse()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
