// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! FMT (modulation and coding) definitions.
//!
//! A MODCOD pairs a modulation with a coding rate; carrier groups reference
//! MODCODs through [`FmtGroup`]s. The definition table is installed once at
//! start-up and then read-only ([`SharedFmtTable`]), since the receive and
//! transmit stacks of a relay must agree on it.

mod converter;

pub use converter::UnitConverter;

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Modulation schemes of the DVB-S2/RCS2 family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    Bpsk,
    Qpsk,
    Psk8,
    Apsk16,
    Apsk32,
}

impl Modulation {
    /// Modulation efficiency in bits per symbol.
    pub fn efficiency(self) -> u32 {
        match self {
            Modulation::Bpsk => 1,
            Modulation::Qpsk => 2,
            Modulation::Psk8 => 3,
            Modulation::Apsk16 => 4,
            Modulation::Apsk32 => 5,
        }
    }
}

/// One MODCOD definition.
#[derive(Debug, Clone)]
pub struct FmtDefinition {
    pub id: u8,
    pub modulation: Modulation,
    /// Coding rate as a fraction (e.g. 0.5 for rate 1/2).
    pub coding_rate: f64,
}

impl FmtDefinition {
    pub fn new(id: u8, modulation: Modulation, coding_rate: f64) -> Self {
        Self { id, modulation, coding_rate }
    }

    /// Useful bits per symbol.
    pub fn spectral_efficiency(&self) -> f64 {
        f64::from(self.modulation.efficiency()) * self.coding_rate
    }
}

/// MODCOD definition table, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct FmtTable {
    definitions: BTreeMap<u8, FmtDefinition>,
}

impl FmtTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small representative DVB-S2 set, lowest id = most robust.
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.add(FmtDefinition::new(1, Modulation::Qpsk, 1.0 / 4.0));
        table.add(FmtDefinition::new(3, Modulation::Qpsk, 1.0 / 2.0));
        table.add(FmtDefinition::new(7, Modulation::Qpsk, 3.0 / 4.0));
        table.add(FmtDefinition::new(13, Modulation::Psk8, 2.0 / 3.0));
        table.add(FmtDefinition::new(18, Modulation::Apsk16, 2.0 / 3.0));
        table.add(FmtDefinition::new(24, Modulation::Apsk32, 3.0 / 4.0));
        table
    }

    pub fn add(&mut self, definition: FmtDefinition) {
        self.definitions.insert(definition.id, definition);
    }

    pub fn definition(&self, id: u8) -> Option<&FmtDefinition> {
        self.definitions.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Parse a MODCOD definition listing: one `id modulation rate` triple
    /// per line (e.g. `3 QPSK 1/2`), `#` starts a comment.
    pub fn parse(text: &str) -> crate::Result<Self> {
        let mut table = Self::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(id), Some(modulation), Some(rate)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(crate::Error::InvalidConfig(format!(
                    "MODCOD line {}: expected 'id modulation rate'",
                    number + 1
                )));
            };
            let id: u8 = id.parse().map_err(|_| {
                crate::Error::InvalidConfig(format!("MODCOD line {}: bad id '{}'", number + 1, id))
            })?;
            let modulation = match modulation {
                "BPSK" => Modulation::Bpsk,
                "QPSK" => Modulation::Qpsk,
                "8PSK" => Modulation::Psk8,
                "16APSK" => Modulation::Apsk16,
                "32APSK" => Modulation::Apsk32,
                other => {
                    return Err(crate::Error::InvalidConfig(format!(
                        "MODCOD line {}: unknown modulation '{}'",
                        number + 1,
                        other
                    )))
                }
            };
            let coding_rate = match rate.split_once('/') {
                Some((numerator, denominator)) => {
                    let numerator: f64 = numerator.parse().map_err(|_| {
                        crate::Error::InvalidConfig(format!(
                            "MODCOD line {}: bad coding rate '{}'",
                            number + 1,
                            rate
                        ))
                    })?;
                    let denominator: f64 = denominator.parse().map_err(|_| {
                        crate::Error::InvalidConfig(format!(
                            "MODCOD line {}: bad coding rate '{}'",
                            number + 1,
                            rate
                        ))
                    })?;
                    if denominator == 0.0 {
                        return Err(crate::Error::InvalidConfig(format!(
                            "MODCOD line {}: zero denominator in '{}'",
                            number + 1,
                            rate
                        )));
                    }
                    numerator / denominator
                }
                None => rate.parse().map_err(|_| {
                    crate::Error::InvalidConfig(format!(
                        "MODCOD line {}: bad coding rate '{}'",
                        number + 1,
                        rate
                    ))
                })?,
            };
            table.add(FmtDefinition::new(id, modulation, coding_rate));
        }
        Ok(table)
    }
}

/// Ordered list of MODCOD ids a carrier group may use.
#[derive(Debug, Clone, Default)]
pub struct FmtGroup {
    fmt_ids: Vec<u8>,
}

impl FmtGroup {
    pub fn new(fmt_ids: Vec<u8>) -> Self {
        Self { fmt_ids }
    }

    /// The reference MODCOD used for slot sizing.
    pub fn first(&self) -> Option<u8> {
        self.fmt_ids.first().copied()
    }

    pub fn fmt_ids(&self) -> &[u8] {
        &self.fmt_ids
    }

    pub fn is_empty(&self) -> bool {
        self.fmt_ids.is_empty()
    }
}

/// Install-once, then read-only FMT table shared between stacks.
///
/// Single-writer discipline: [`SharedFmtTable::install`] is called before
/// any packet flows; readers take cheap snapshots afterwards.
#[derive(Debug, Default)]
pub struct SharedFmtTable {
    inner: ArcSwap<FmtTable>,
}

impl SharedFmtTable {
    pub fn new() -> Self {
        Self { inner: ArcSwap::from_pointee(FmtTable::new()) }
    }

    pub fn install(&self, table: FmtTable) {
        self.inner.store(Arc::new(table));
    }

    pub fn load(&self) -> Arc<FmtTable> {
        self.inner.load_full()
    }
}
