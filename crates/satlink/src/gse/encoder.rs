// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSE encoder: burst-level encapsulation with multi-packet packing.
//!
//! Fixed-length uppers (MPEG/ATM cells) accumulate in per-identifier
//! packing contexts until the buffer cannot take another cell or the
//! packing threshold elapses; variable-length uppers map to exactly one
//! PDU. The packing timer itself lives with the caller: the encoder only
//! emits [`FlushIntent`]s and expects a [`GseEncoder::flush`] back when
//! one expires.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::EncapConfig;
use crate::gse::encap::{EncapMetadata, Encapsulator};
use crate::gse::ext::{encode_cni, CNI_EXTENSION_LENGTH};
use crate::gse::header::{parse_packet, write_complete, PacketVariant};
use crate::gse::{frag_id, GseIdentifier, Label, MAX_PACKET_LENGTH};
use crate::net::{Burst, Packet, Protocol, MIN_ETHER_TYPE};
use crate::{Error, Result, SpotId, TalId};

/// Ask from the encoder to the upper layer: arm a timer and call
/// [`GseEncoder::flush`] with `context_id` on expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushIntent {
    pub delay: Duration,
    pub context_id: u16,
}

/// Extension payloads the encoder can inject, one variant per known kind.
#[derive(Debug, Clone, Copy)]
pub enum ExtensionPayload {
    /// Carrier-to-noise indication.
    Cni(u32),
}

/// Packing accumulator for one `(src, dst, qos)` identifier.
///
/// The byte buffer is recycled: draining marks the context `reset` instead
/// of freeing it, and the next `add` restarts the logical content in place.
#[derive(Debug)]
struct PackingContext {
    buffer: Vec<u8>,
    protocol: Option<Protocol>,
    full: bool,
    reset: bool,
    dst_spot: SpotId,
}

impl PackingContext {
    fn new(dst_spot: SpotId) -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_PACKET_LENGTH),
            protocol: None,
            full: false,
            reset: false,
            dst_spot,
        }
    }

    /// Append a cell. Restarts the buffer first when flagged for reset.
    fn add(&mut self, packet: &Packet) -> Result<()> {
        if self.reset {
            self.buffer.clear();
            self.full = false;
            self.protocol = None;
            self.reset = false;
        }
        if self.full {
            return Err(Error::PackingBufferOverflow);
        }
        if self.protocol.is_none() {
            self.protocol = Some(packet.protocol());
            self.dst_spot = packet.dst_spot();
        }
        let length = packet.total_length();
        if self.buffer.len() + length > MAX_PACKET_LENGTH {
            return Err(Error::PackingBufferOverflow);
        }
        self.buffer.extend_from_slice(packet.data());
        if MAX_PACKET_LENGTH - self.buffer.len() < length {
            self.full = true;
        }
        Ok(())
    }

    fn has_data(&self) -> bool {
        !self.reset && !self.buffer.is_empty()
    }

    /// Hand out the accumulated bytes and flag the context for recycling.
    fn drain(&mut self) -> (Vec<u8>, Option<Protocol>, SpotId) {
        let pdu = self.buffer.clone();
        let protocol = self.protocol;
        self.full = false;
        self.reset = true;
        (pdu, protocol, self.dst_spot)
    }
}

/// Stateful GSE encoder (transmit side).
#[derive(Debug)]
pub struct GseEncoder {
    encap: Encapsulator,
    contexts: BTreeMap<GseIdentifier, PackingContext>,
    packing_threshold: Duration,
}

impl GseEncoder {
    pub fn new(config: &EncapConfig) -> Self {
        let mut encap = Encapsulator::new();
        if config.force_library_compat || config.max_reuse == 0 {
            encap.disable_label_reuse();
        } else {
            encap.enable_label_reuse(config.max_reuse);
        }
        Self {
            encap,
            contexts: BTreeMap::new(),
            packing_threshold: config.packing_threshold,
        }
    }

    /// Encapsulate an upper burst into GSE packets.
    ///
    /// Fixed-length cells of the same identifier accumulate across the
    /// whole burst; a context still holding room at the end of the burst
    /// is drained when the packing threshold is zero, and otherwise kept
    /// open behind a [`FlushIntent`] for the upper layer's timer.
    /// Offending packets are dropped with an error log; the rest of the
    /// burst is processed.
    pub fn encapsulate(&mut self, burst: Burst) -> Result<(Burst, Vec<FlushIntent>)> {
        let mut gse_packets = Burst::new();
        let mut touched: Vec<GseIdentifier> = Vec::new();

        for packet in burst {
            let outcome = match packet.protocol().fixed_length() {
                Some(cell_length) => {
                    self.encap_fixed_length(&packet, cell_length, &mut gse_packets, &mut touched)
                }
                None => self.encap_variable_length(&packet, &mut gse_packets),
            };
            if let Err(err) = outcome {
                log::error!(
                    "cannot encapsulate a {} packet (src {} dst {} qos {}): {}, drop it",
                    packet.protocol(),
                    packet.src_tal_id(),
                    packet.dst_tal_id(),
                    packet.qos(),
                    err
                );
            }
        }

        // end of burst: emit or defer whatever is still accumulating
        let mut intents = Vec::new();
        for ident in touched {
            let has_data = self.contexts.get(&ident).is_some_and(PackingContext::has_data);
            if !has_data {
                continue;
            }
            if self.packing_threshold.is_zero() {
                self.drain_context(ident, &mut gse_packets)?;
            } else {
                intents.push(FlushIntent {
                    delay: self.packing_threshold,
                    context_id: ident.context_id(),
                });
            }
        }
        Ok((gse_packets, intents))
    }

    fn encap_fixed_length(
        &mut self,
        packet: &Packet,
        cell_length: usize,
        gse_packets: &mut Burst,
        touched: &mut Vec<GseIdentifier>,
    ) -> Result<()> {
        if packet.total_length() != cell_length {
            return Err(Error::BadUpperLength {
                expected: cell_length,
                actual: packet.total_length(),
            });
        }

        let ident =
            GseIdentifier::new(packet.src_tal_id(), packet.dst_tal_id(), packet.qos());
        let context = self
            .contexts
            .entry(ident)
            .or_insert_with(|| PackingContext::new(packet.dst_spot()));
        context.add(packet)?;
        let full = context.full;
        log::debug!(
            "context 0x{:03x} now holds {} bytes",
            ident.context_id(),
            context.buffer.len()
        );
        if !touched.contains(&ident) {
            touched.push(ident);
        }

        if full {
            // no room for another cell, the timer cannot help
            return self.drain_context(ident, gse_packets);
        }
        Ok(())
    }

    fn encap_variable_length(&mut self, packet: &Packet, gse_packets: &mut Burst) -> Result<()> {
        let ident =
            GseIdentifier::new(packet.src_tal_id(), packet.dst_tal_id(), packet.qos());
        self.produce(
            packet.data().to_vec(),
            packet.protocol().id(),
            ident,
            packet.dst_spot(),
            gse_packets,
        )
    }

    fn drain_context(&mut self, ident: GseIdentifier, gse_packets: &mut Burst) -> Result<()> {
        let Some(context) = self.contexts.get_mut(&ident) else {
            return Err(Error::UnknownContext(ident.context_id()));
        };
        if !context.has_data() {
            return Ok(());
        }
        let (pdu, protocol, dst_spot) = context.drain();
        let protocol_id = protocol.map_or_else(|| Protocol::Mpeg.id(), Protocol::id);
        self.produce(pdu, protocol_id, ident, dst_spot, gse_packets)
    }

    /// Segment one PDU and wrap the produced GSE packets.
    fn produce(
        &mut self,
        pdu: Vec<u8>,
        protocol_id: u16,
        ident: GseIdentifier,
        dst_spot: SpotId,
        gse_packets: &mut Burst,
    ) -> Result<()> {
        let label = Label::six(ident.src_tal_id, ident.dst_tal_id, ident.qos)?;
        let fid = frag_id(ident.src_tal_id, ident.qos);
        self.encap
            .receive_pdu(pdu, EncapMetadata { protocol_type: protocol_id, label }, fid)?;

        let mut counter = 0u32;
        while let Some(bytes) = self.encap.next_packet(fid, MAX_PACKET_LENGTH)? {
            counter += 1;
            // The encoder knows the identifier, so the wrapper is built
            // directly instead of re-deriving addressing from the bytes
            // (which a ReUse label could not provide).
            let (variant, _) = parse_packet(&bytes)?;
            let (header_length, trailer_length) = match variant {
                PacketVariant::Complete { label, .. } => (4 + label.len(), 0),
                PacketVariant::First { label, .. } => (7 + label.len(), 0),
                PacketVariant::Subsequent { end, .. } => (3, if end { 4 } else { 0 }),
                PacketVariant::Padding => {
                    return Err(Error::Codec("engine produced padding".to_string()))
                }
            };
            let mut gse = Packet::from_parts(
                Protocol::Gse,
                bytes,
                ident.qos,
                ident.src_tal_id,
                ident.dst_tal_id,
                header_length,
                trailer_length,
            );
            gse.set_dst_spot(dst_spot);
            gse_packets.add(gse);
        }
        log::debug!(
            "PDU for context 0x{:03x} produced {} GSE packet(s)",
            ident.context_id(),
            counter
        );
        Ok(())
    }

    /// Drain the packing context identified by `context_id`.
    ///
    /// Called by the upper layer when a [`FlushIntent`] timer expires, or
    /// early to cancel the deferral; no data is lost either way.
    pub fn flush(&mut self, context_id: u16) -> Result<Burst> {
        let ident = GseIdentifier::from_context_id(context_id);
        if !self.contexts.contains_key(&ident) {
            return Err(Error::UnknownContext(context_id));
        }
        let mut gse_packets = Burst::new();
        self.drain_context(ident, &mut gse_packets)?;
        Ok(gse_packets)
    }

    /// Drain every live packing context, oldest identifier first.
    pub fn flush_all(&mut self) -> Result<Burst> {
        let idents: Vec<GseIdentifier> = self
            .contexts
            .iter()
            .filter(|(_, context)| context.has_data())
            .map(|(ident, _)| *ident)
            .collect();
        let mut gse_packets = Burst::new();
        for ident in idents {
            self.drain_context(ident, &mut gse_packets)?;
        }
        Ok(gse_packets)
    }

    /// Inject a header extension into the next outgoing GSE packet.
    ///
    /// `packet` is the candidate next packet, if any. A complete GSE packet
    /// without extensions is rebuilt with the extension in front of its
    /// PDU; a packet that already carries extensions is returned untouched;
    /// a fragment cannot carry extensions, so (as with no candidate at all)
    /// an empty GSE-only packet is synthesised to carry the value.
    pub fn set_header_extension(
        &mut self,
        packet: Option<Packet>,
        src_tal_id: TalId,
        dst_tal_id: TalId,
        payload: ExtensionPayload,
    ) -> Result<Packet> {
        let candidate = match packet {
            Some(packet) => {
                let (variant, _) = parse_packet(packet.data())?;
                match variant {
                    PacketVariant::Complete { protocol_type, .. }
                        if protocol_type >= MIN_ETHER_TYPE =>
                    {
                        Some(packet)
                    }
                    PacketVariant::Complete { .. } => {
                        log::debug!("packet already carries extensions, leave it");
                        return Ok(packet);
                    }
                    _ => {
                        log::debug!("fragments cannot carry extensions, synthesise a carrier");
                        None
                    }
                }
            }
            None => None,
        };

        let ExtensionPayload::Cni(cni) = payload;
        match candidate {
            Some(packet) => {
                let (variant, _) = parse_packet(packet.data())?;
                let PacketVariant::Complete { protocol_type, label, payload: pdu } = variant
                else {
                    return Err(Error::Codec("extension candidate is not complete".to_string()));
                };
                let (outer, ext_bytes) = encode_cni(cni, protocol_type);
                let mut extended = Vec::with_capacity(pdu.len() + CNI_EXTENSION_LENGTH);
                extended.extend_from_slice(&ext_bytes);
                extended.extend_from_slice(pdu);
                let bytes = write_complete(outer, label, &extended);
                let mut rebuilt = Packet::from_parts(
                    Protocol::Gse,
                    bytes,
                    packet.qos(),
                    packet.src_tal_id(),
                    packet.dst_tal_id(),
                    packet.header_length(),
                    0,
                );
                rebuilt.set_dst_spot(packet.dst_spot());
                Ok(rebuilt)
            }
            None => {
                // GSE-only packet: a three-byte label and the CNI extension
                // announcing an empty IPv4 PDU.
                let label = Label::three(src_tal_id, dst_tal_id, 0)?;
                let (outer, ext_bytes) = encode_cni(cni, Protocol::Ipv4.id());
                let bytes = write_complete(outer, label, &ext_bytes);
                Ok(Packet::from_parts(
                    Protocol::Gse,
                    bytes,
                    0,
                    src_tal_id,
                    dst_tal_id,
                    4 + label.len(),
                    0,
                ))
            }
        }
    }
}
