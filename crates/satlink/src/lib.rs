// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # satlink - DVB-S2/RCS encapsulation core
//!
//! A pure Rust implementation of the link-layer pipeline of a DVB-S2/RCS
//! satellite emulation testbed: GSE (Generic Stream Encapsulation) with
//! packing, cross-frame fragmentation and header extensions, and a
//! Slotted-ALOHA random-access MAC (DSA/CRDSA) with per-terminal PDU
//! reassembly.
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Upper layers (external)                     |
//! |          IP / Ethernet / ROHC bursts, TUN readers, DAMA            |
//! +--------------------------------------------------------------------+
//! |                         Encapsulation layer                        |
//! |   GseEncoder (packing, fragmentation) | GseDecoder (reassembly)    |
//! |               ChunkingPort (frame-budget refragmentation)          |
//! +--------------------------------------------------------------------+
//! |                        Random-access layer                         |
//! |   SalohaController -> collision resolution (DSA/CRDSA) -> PDU      |
//! |   reassembly -> ACK control frames                                 |
//! +--------------------------------------------------------------------+
//! |                       Resource model layer                         |
//! |   TerminalCatalog | carrier groups | slot inventories | MODCODs    |
//! +--------------------------------------------------------------------+
//! ```
//!
//! Transmit path: an upper [`net::Burst`] enters [`gse::GseEncoder`], which
//! emits GSE packets; a frame scheduler pulls byte-budgeted chunks through
//! [`gse::chunk`]. Receive path: [`saloha::SalohaController`] deposits
//! frames into slot inventories, resolves collisions, reassembles PDUs and
//! hands the recovered GSE packets to [`gse::GseDecoder`], which rebuilds
//! the original upper burst.
//!
//! ## Key types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`net::Packet`] | Owned network packet with addressing attributes |
//! | [`gse::GseEncoder`] | Stateful encapsulator with multi-packet packing |
//! | [`gse::GseDecoder`] | Stateful de-encapsulator with fragment reassembly |
//! | [`saloha::SalohaController`] | Receive/schedule cycle of the random-access channel |
//! | [`terminal::TerminalCatalog`] | Terminal/category/slot state shared by both paths |
//!
//! The core is synchronous and single-threaded per stack instance; the only
//! cross-stack state is the install-once MODCOD table ([`fmt::SharedFmtTable`])
//! and the satellite delay value ([`delay::DelayMap`]).

/// Configuration surface for the encoder, decoder and random-access layer.
pub mod config;
/// Mutex-protected satellite delay model shared between stacks.
pub mod delay;
/// MODCOD definitions, FMT groups and symbol/slot unit conversion.
pub mod fmt;
/// GSE encapsulation: wire codec, encoder, decoder and chunking port.
pub mod gse;
/// MPEG-2 TS encapsulation: SNDU packing into fixed 188-byte cells.
pub mod mpeg;
/// Network packet model: protocols, packets, bursts, containers.
pub mod net;
/// Slotted-ALOHA random access: packets, frames, algorithms, controller.
pub mod saloha;
/// Terminal state: categories, carrier groups, slot inventories, catalog.
pub mod terminal;

pub use net::{Burst, Container, Packet, Protocol};

/// Terminal identifier (5-bit on the wire, 31 = broadcast).
pub type TalId = u8;
/// QoS class, `0..=7`.
pub type Qos = u8;
/// Spot (beam coverage area) identifier.
pub type SpotId = u16;
/// Superframe counter.
pub type SuperframeId = u16;

/// Broadcast terminal id; values above it are reserved for simulated traffic.
pub const BROADCAST_TAL_ID: TalId = 31;

/// Errors returned by satlink operations.
///
/// Behavioural policy follows the error-handling design of the stack:
/// malformed inputs and library-level failures are dropped (and logged) by
/// the component that detects them, so most variants only ever cross the
/// API boundary on configuration or direct misuse.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// Configuration rejected at init time (block refuses to start).
    InvalidConfig(String),
    /// Unrecognised Slotted-ALOHA algorithm name.
    UnknownAlgorithm(String),

    // ========================================================================
    // Packet model errors
    // ========================================================================
    /// Buffer shorter than the protocol's minimum header length.
    InvalidLength { min: usize, actual: usize },
    /// Indicator bits or length fields disagree with the buffer size.
    Malformed(String),
    /// A header extension with this id is already present on the packet.
    DuplicateExtension(u16),
    /// No header extension with this id on the packet.
    ExtensionMissing(u16),

    // ========================================================================
    // Encapsulation errors
    // ========================================================================
    /// Fixed-length upper packet whose size disagrees with the configured length.
    BadUpperLength { expected: usize, actual: usize },
    /// A packing context buffer cannot take the offered packet.
    PackingBufferOverflow,
    /// `flush` addressed a packing context that does not exist.
    UnknownContext(u16),
    /// GSE engine failure, with the engine status passed through.
    Codec(String),
    /// CRC-32 of a reassembled PDU disagrees with the fragment trailer.
    CrcMismatch { stored: u32, computed: u32 },
    /// PDU larger than the configured or protocol maximum.
    PduTooLarge { max: usize, actual: usize },
    /// Refragmentation failed; neither output is produced.
    Chunking(String),

    // ========================================================================
    // Terminal / random-access errors
    // ========================================================================
    /// Terminal has no category mapping and no default category exists.
    NoCategoryForTerminal(TalId),
    /// Packet references a terminal the catalog does not know.
    UnknownTerminal(TalId),
    /// Packet references a slot outside the category inventory.
    UnknownSlot(u16),
    /// Tal id outside the addressable range for this operation.
    InvalidTalId(TalId),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::UnknownAlgorithm(name) => {
                write!(f, "Unknown Slotted Aloha algorithm: {}", name)
            }
            Error::InvalidLength { min, actual } => {
                write!(f, "Invalid length: {} (minimum {})", actual, min)
            }
            Error::Malformed(msg) => write!(f, "Malformed packet: {}", msg),
            Error::DuplicateExtension(id) => {
                write!(f, "Duplicate header extension 0x{:04x}", id)
            }
            Error::ExtensionMissing(id) => {
                write!(f, "Missing header extension 0x{:04x}", id)
            }
            Error::BadUpperLength { expected, actual } => {
                write!(f, "Bad upper packet length: {} (expected {})", actual, expected)
            }
            Error::PackingBufferOverflow => write!(f, "Packing buffer overflow"),
            Error::UnknownContext(id) => write!(f, "Unknown packing context 0x{:03x}", id),
            Error::Codec(status) => write!(f, "GSE engine error: {}", status),
            Error::CrcMismatch { stored, computed } => {
                write!(f, "CRC mismatch: stored 0x{:08x}, computed 0x{:08x}", stored, computed)
            }
            Error::PduTooLarge { max, actual } => {
                write!(f, "PDU too large: {} (maximum {})", actual, max)
            }
            Error::Chunking(msg) => write!(f, "Chunking error: {}", msg),
            Error::NoCategoryForTerminal(tal_id) => {
                write!(f, "No category for terminal {}", tal_id)
            }
            Error::UnknownTerminal(tal_id) => write!(f, "Unknown terminal {}", tal_id),
            Error::UnknownSlot(slot_id) => write!(f, "Unknown slot {}", slot_id),
            Error::InvalidTalId(tal_id) => write!(f, "Invalid tal id {}", tal_id),
        }
    }
}

impl std::error::Error for Error {}

/// Convenience result type for satlink operations.
pub type Result<T> = std::result::Result<T, Error>;
