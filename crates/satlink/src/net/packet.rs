// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Owned network packet with addressing attributes and header extensions.

use std::collections::BTreeMap;

use crate::net::Protocol;
use crate::{Error, Qos, Result, SpotId, TalId};

/// A network packet: one contiguous byte buffer (headers included) plus the
/// attributes the stack routes on.
///
/// Packets are owned exclusively by the burst that contains them and are
/// moved, never aliased, across layer boundaries.
#[derive(Debug, Clone)]
pub struct Packet {
    data: Vec<u8>,
    protocol: Protocol,
    qos: Qos,
    src_tal_id: TalId,
    dst_tal_id: TalId,
    spot_id: SpotId,
    header_length: usize,
    trailer_length: usize,
    /// In-band header extensions, keyed by 16-bit extension id.
    extensions: BTreeMap<u16, Vec<u8>>,
}

impl Packet {
    /// Build a packet, validating the buffer against the protocol's minimum
    /// header length.
    pub fn build(
        protocol: Protocol,
        data: &[u8],
        qos: Qos,
        src_tal_id: TalId,
        dst_tal_id: TalId,
    ) -> Result<Self> {
        let min = protocol.min_header_length();
        if data.len() < min {
            return Err(Error::InvalidLength { min, actual: data.len() });
        }
        Ok(Self {
            data: data.to_vec(),
            protocol,
            qos,
            src_tal_id,
            dst_tal_id,
            spot_id: 0,
            header_length: min,
            trailer_length: 0,
            extensions: BTreeMap::new(),
        })
    }

    /// Build a packet taking ownership of `data`, with explicit header and
    /// trailer accounting. Used by the codecs, which know the exact variant
    /// they produced.
    pub fn from_parts(
        protocol: Protocol,
        data: Vec<u8>,
        qos: Qos,
        src_tal_id: TalId,
        dst_tal_id: TalId,
        header_length: usize,
        trailer_length: usize,
    ) -> Self {
        Self {
            data,
            protocol,
            qos,
            src_tal_id,
            dst_tal_id,
            spot_id: 0,
            header_length,
            trailer_length,
            extensions: BTreeMap::new(),
        }
    }

    /// Full packet bytes, headers included.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total length in bytes.
    pub fn total_length(&self) -> usize {
        self.data.len()
    }

    /// Payload bytes (between header and trailer).
    pub fn payload(&self) -> &[u8] {
        let end = self.data.len().saturating_sub(self.trailer_length);
        &self.data[self.header_length.min(end)..end]
    }

    /// Payload length in bytes.
    pub fn payload_length(&self) -> usize {
        self.data
            .len()
            .saturating_sub(self.header_length + self.trailer_length)
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn qos(&self) -> Qos {
        self.qos
    }

    pub fn src_tal_id(&self) -> TalId {
        self.src_tal_id
    }

    pub fn dst_tal_id(&self) -> TalId {
        self.dst_tal_id
    }

    /// Destination spot id (beam), set by the routing layer.
    pub fn dst_spot(&self) -> SpotId {
        self.spot_id
    }

    pub fn set_dst_spot(&mut self, spot_id: SpotId) {
        self.spot_id = spot_id;
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    pub fn trailer_length(&self) -> usize {
        self.trailer_length
    }

    /// Attach a header extension. Keys are unique per packet.
    pub fn add_header_extension(&mut self, id: u16, bytes: Vec<u8>) -> Result<()> {
        if self.extensions.contains_key(&id) {
            return Err(Error::DuplicateExtension(id));
        }
        self.extensions.insert(id, bytes);
        Ok(())
    }

    /// Read back a header extension by id.
    pub fn header_extension(&self, id: u16) -> Result<&[u8]> {
        self.extensions
            .get(&id)
            .map(Vec::as_slice)
            .ok_or(Error::ExtensionMissing(id))
    }

    /// All attached extensions in id order.
    pub fn header_extensions(&self) -> impl Iterator<Item = (u16, &[u8])> {
        self.extensions.iter().map(|(id, bytes)| (*id, bytes.as_slice()))
    }

    /// Consume the packet, returning its byte buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_checks_minimum_length() {
        let err = Packet::build(Protocol::Ipv4, &[0u8; 10], 0, 1, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidLength { min: 20, actual: 10 }));
        assert!(Packet::build(Protocol::Ipv4, &[0u8; 20], 0, 1, 2).is_ok());
    }

    #[test]
    fn attributes_are_preserved() {
        let pkt = Packet::build(Protocol::Mpeg, &[0u8; 188], 3, 1, 2).unwrap();
        assert_eq!(pkt.qos(), 3);
        assert_eq!(pkt.src_tal_id(), 1);
        assert_eq!(pkt.dst_tal_id(), 2);
        assert_eq!(pkt.total_length(), 188);
    }

    #[test]
    fn duplicate_extension_rejected() {
        let mut pkt = Packet::build(Protocol::Ipv4, &[0u8; 20], 0, 1, 2).unwrap();
        pkt.add_header_extension(0x00FF, vec![1, 2, 3, 4]).unwrap();
        let err = pkt.add_header_extension(0x00FF, vec![5]).unwrap_err();
        assert!(matches!(err, Error::DuplicateExtension(0x00FF)));
        assert_eq!(pkt.header_extension(0x00FF).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn missing_extension_reported() {
        let pkt = Packet::build(Protocol::Ipv4, &[0u8; 20], 0, 1, 2).unwrap();
        assert!(matches!(
            pkt.header_extension(0x0042),
            Err(Error::ExtensionMissing(0x0042))
        ));
    }
}
