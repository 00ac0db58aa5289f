// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Configuration surface of the encapsulation core.
//!
//! These structs are the *whole* configuration influence on the core: the
//! encoder options, the decoder options and the random-access options.
//! Loading them from files is the host's concern.

use std::time::Duration;

use crate::{Error, Result};

/// GSE encoder options.
#[derive(Debug, Clone)]
pub struct EncapConfig {
    /// How long a packing context may wait for further fixed-length
    /// packets before the upper layer flushes it. Zero disables packing
    /// deferral entirely.
    pub packing_threshold: Duration,
    /// Force six-byte labels on every complete/first packet so legacy
    /// receivers without ReUse support can decode the stream.
    pub force_library_compat: bool,
    /// Maximum consecutive ReUse labels (0 disables label re-use).
    pub max_reuse: u8,
}

impl Default for EncapConfig {
    fn default() -> Self {
        Self {
            packing_threshold: Duration::ZERO,
            force_library_compat: false,
            max_reuse: 0,
        }
    }
}

/// GSE decoder options.
#[derive(Debug, Clone)]
pub struct DecapConfig {
    /// Size of the reassembly context pool (contexts are keyed by
    /// `frag_id % max_frag_id`).
    pub max_frag_id: u8,
    /// Upper bound on a single reassembled PDU.
    pub max_pdu_size: usize,
}

impl Default for DecapConfig {
    fn default() -> Self {
        Self { max_frag_id: 16, max_pdu_size: 65_535 }
    }
}

/// Collision-resolution algorithm of the random-access channel.
///
/// A runtime variant selected at init; call sites dispatch by `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionAlgorithm {
    /// Diversity Slotted ALOHA.
    Dsa,
    /// Contention-Resolution Diversity Slotted ALOHA.
    Crdsa,
}

impl std::str::FromStr for CollisionAlgorithm {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "DSA" => Ok(CollisionAlgorithm::Dsa),
            "CRDSA" => Ok(CollisionAlgorithm::Crdsa),
            other => Err(Error::UnknownAlgorithm(other.to_string())),
        }
    }
}

impl std::fmt::Display for CollisionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollisionAlgorithm::Dsa => f.write_str("DSA"),
            CollisionAlgorithm::Crdsa => f.write_str("CRDSA"),
        }
    }
}

/// Synthetic-traffic profile for one terminal category.
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    /// Category label the profile applies to.
    pub category: String,
    /// Maximum simulated packets per schedule tick.
    pub nb_max_packets: u16,
    /// Replicas per simulated PDU.
    pub nb_replicas: u16,
    /// Load ratio in percent.
    pub ratio: u8,
}

/// Slotted-ALOHA controller options.
#[derive(Debug, Clone)]
pub struct SalohaConfig {
    pub algorithm: CollisionAlgorithm,
    /// Replicas per data packet on the transmit side.
    pub nb_replicas: u16,
    /// Synthetic traffic, one profile per category.
    pub simulations: Vec<SimulationProfile>,
}

impl Default for SalohaConfig {
    fn default() -> Self {
        Self {
            algorithm: CollisionAlgorithm::Dsa,
            nb_replicas: 2,
            simulations: Vec::new(),
        }
    }
}
