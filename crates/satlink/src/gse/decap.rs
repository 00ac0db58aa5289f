// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! GSE de-encapsulation engine.
//!
//! Reassembly contexts live in a fixed pool keyed by
//! `frag_id % max_frag_id`; a first fragment landing on an occupied slot
//! evicts the previous partial PDU (the overwritten-context outcome). The
//! last fragment's CRC-32 is verified before a PDU is released.

use crate::gse::ext::{parse_extensions, HeaderExtension};
use crate::gse::header::{parse_packet, pdu_crc, PacketVariant};
use crate::gse::{Label, CRC_LENGTH, PROTOCOL_TYPE_LENGTH};
use crate::{Error, Result};

/// What the engine recovered alongside a complete PDU.
#[derive(Debug, Clone)]
pub struct DecapMetadata {
    /// Upper-layer protocol type, extension chain already resolved.
    pub protocol_type: u16,
    /// The PDU's label (re-use already resolved).
    pub label: Label,
    /// In-band header extensions found in front of the PDU.
    pub extensions: Vec<HeaderExtension>,
}

/// Outcome of feeding one GSE packet to the engine.
#[derive(Debug)]
pub enum DecapStatus {
    /// A whole PDU is available.
    Completed { pdu: Vec<u8>, metadata: DecapMetadata },
    /// Fragment stored; reassembly continues.
    FragmentStored,
    /// Fragment stored, but a previous partial PDU was evicted because its
    /// pool slot was required.
    ContextOverwritten,
    /// End-of-container padding; nothing further follows.
    Padding,
    /// A subsequent fragment arrived with no context (first fragment lost
    /// or addressed to another receiver). Not an error.
    ContextNotInit,
}

#[derive(Debug)]
struct FragContext {
    frag_id: u8,
    label: Label,
    protocol_type: u16,
    total_length: u16,
    pdu: Vec<u8>,
}

impl FragContext {
    fn expected_pdu_length(&self) -> usize {
        usize::from(self.total_length)
            .saturating_sub(PROTOCOL_TYPE_LENGTH + self.label.len())
    }
}

/// Stateful GSE de-encapsulator.
#[derive(Debug)]
pub struct Decapsulator {
    contexts: Vec<Option<FragContext>>,
    max_pdu_size: usize,
    last_label: Option<Label>,
}

impl Decapsulator {
    /// `max_frag_id` bounds the reassembly pool; `max_pdu_size` bounds any
    /// single reassembled PDU.
    pub fn new(max_frag_id: u8, max_pdu_size: usize) -> Self {
        let slots = usize::from(max_frag_id).max(1);
        Self {
            contexts: (0..slots).map(|_| None).collect(),
            max_pdu_size,
            last_label: None,
        }
    }

    fn slot(&self, frag_id: u8) -> usize {
        usize::from(frag_id) % self.contexts.len()
    }

    fn resolve_label(&mut self, label: Label) -> Result<Label> {
        match label {
            Label::ReUse => self.last_label.ok_or_else(|| {
                Error::Malformed("re-use label without a previously carried label".to_string())
            }),
            Label::Six(_) | Label::Three(_) => {
                self.last_label = Some(label);
                Ok(label)
            }
            // Broadcast is never a valid re-use target.
            Label::Broadcast => Ok(label),
        }
    }

    /// Feed one GSE packet from the head of `data`.
    ///
    /// Returns the outcome and the number of bytes consumed, so callers can
    /// walk a container of concatenated packets.
    pub fn decap(&mut self, data: &[u8]) -> Result<(DecapStatus, usize)> {
        let (variant, consumed) = parse_packet(data)?;
        match variant {
            PacketVariant::Padding => Ok((DecapStatus::Padding, consumed)),
            PacketVariant::Complete { protocol_type, label, payload } => {
                let label = self.resolve_label(label)?;
                let (extensions, upper, ext_len) = parse_extensions(protocol_type, payload)?;
                let pdu = payload[ext_len..].to_vec();
                if pdu.len() > self.max_pdu_size {
                    return Err(Error::PduTooLarge { max: self.max_pdu_size, actual: pdu.len() });
                }
                Ok((
                    DecapStatus::Completed {
                        pdu,
                        metadata: DecapMetadata { protocol_type: upper, label, extensions },
                    },
                    consumed,
                ))
            }
            PacketVariant::First { frag_id, total_length, protocol_type, label, payload } => {
                let label = self.resolve_label(label)?;
                let context = FragContext {
                    frag_id,
                    label,
                    protocol_type,
                    total_length,
                    pdu: payload.to_vec(),
                };
                let expected = context.expected_pdu_length();
                if expected > self.max_pdu_size {
                    return Err(Error::PduTooLarge { max: self.max_pdu_size, actual: expected });
                }
                if payload.len() > expected {
                    return Err(Error::Malformed(format!(
                        "first fragment already holds {} of {} PDU bytes",
                        payload.len(),
                        expected
                    )));
                }
                let slot = self.slot(frag_id);
                let overwritten = self.contexts[slot].is_some();
                self.contexts[slot] = Some(context);
                if overwritten {
                    Ok((DecapStatus::ContextOverwritten, consumed))
                } else {
                    Ok((DecapStatus::FragmentStored, consumed))
                }
            }
            PacketVariant::Subsequent { frag_id, end, payload } => {
                let slot = self.slot(frag_id);
                let matches = self.contexts[slot]
                    .as_ref()
                    .is_some_and(|ctx| ctx.frag_id == frag_id);
                if !matches {
                    return Ok((DecapStatus::ContextNotInit, consumed));
                }
                if end {
                    let Some(mut context) = self.contexts[slot].take() else {
                        return Ok((DecapStatus::ContextNotInit, consumed));
                    };
                    let (body, trailer) = payload.split_at(payload.len() - CRC_LENGTH);
                    context.pdu.extend_from_slice(body);
                    let expected = context.expected_pdu_length();
                    if context.pdu.len() != expected {
                        return Err(Error::Malformed(format!(
                            "reassembled {} PDU bytes, total length field says {}",
                            context.pdu.len(),
                            expected
                        )));
                    }
                    let stored = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
                    let computed = pdu_crc(
                        context.total_length,
                        context.protocol_type,
                        context.label,
                        &context.pdu,
                    );
                    if stored != computed {
                        return Err(Error::CrcMismatch { stored, computed });
                    }
                    let (extensions, upper, ext_len) =
                        parse_extensions(context.protocol_type, &context.pdu)?;
                    let pdu = context.pdu.split_off(ext_len);
                    Ok((
                        DecapStatus::Completed {
                            pdu,
                            metadata: DecapMetadata {
                                protocol_type: upper,
                                label: context.label,
                                extensions,
                            },
                        },
                        consumed,
                    ))
                } else {
                    let Some(context) = self.contexts[slot].as_mut() else {
                        return Ok((DecapStatus::ContextNotInit, consumed));
                    };
                    context.pdu.extend_from_slice(payload);
                    // equality is legal: the last fragment may carry only
                    // the CRC trailer
                    if context.pdu.len() > context.expected_pdu_length() {
                        let got = context.pdu.len();
                        let expected = context.expected_pdu_length();
                        self.contexts[slot] = None;
                        return Err(Error::Malformed(format!(
                            "fragment overruns the PDU: {} of {} bytes before the last fragment",
                            got, expected
                        )));
                    }
                    Ok((DecapStatus::FragmentStored, consumed))
                }
            }
        }
    }
}
