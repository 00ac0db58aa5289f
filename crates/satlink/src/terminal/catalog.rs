// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The terminal catalog: category affectation and per-terminal state.

use std::collections::BTreeMap;

use crate::fmt::{FmtTable, UnitConverter};
use crate::saloha::reassembly::TerminalContext;
use crate::terminal::TerminalCategory;
use crate::{Error, Result, TalId, BROADCAST_TAL_ID};

/// Binds terminals to Slotted-ALOHA categories and owns the per-terminal
/// reassembly contexts.
///
/// The affectation map may name categories that are not Slotted-ALOHA
/// categories (`None` or a label absent from `categories`); such terminals
/// are accepted without registering in the random-access tables.
#[derive(Debug, Default)]
pub struct TerminalCatalog {
    categories: BTreeMap<String, TerminalCategory>,
    affectation: BTreeMap<TalId, Option<String>>,
    default_category: Option<String>,
    terminals: BTreeMap<TalId, TerminalContext>,
}

impl TerminalCatalog {
    pub fn new(
        categories: Vec<TerminalCategory>,
        affectation: BTreeMap<TalId, Option<String>>,
        default_category: Option<String>,
    ) -> Self {
        if default_category.is_none() {
            log::warn!(
                "no default terminal affectation, some terminals may not be able to log in"
            );
        }
        Self {
            categories: categories
                .into_iter()
                .map(|category| (category.label().to_string(), category))
                .collect(),
            affectation,
            default_category,
            terminals: BTreeMap::new(),
        }
    }

    /// Size every category's slot inventory.
    pub fn compute_slots(&mut self, converter: &mut UnitConverter, fmt_table: &FmtTable) {
        for category in self.categories.values_mut() {
            category.compute_slots(converter, fmt_table);
        }
    }

    /// Category label a terminal would be assigned to.
    ///
    /// `Ok(None)` means the terminal is explicitly outside Slotted ALOHA;
    /// an unknown terminal falls back to the default category or fails.
    pub fn assign_category(&self, tal_id: TalId) -> Result<Option<&str>> {
        match self.affectation.get(&tal_id) {
            Some(Some(label)) => Ok(Some(label.as_str())),
            Some(None) => Ok(None),
            None => match &self.default_category {
                Some(label) => Ok(Some(label.as_str())),
                None => Err(Error::NoCategoryForTerminal(tal_id)),
            },
        }
    }

    /// Register a terminal.
    ///
    /// Idempotent: a duplicate add is a reboot, not an error. A terminal
    /// assigned to a non-Slotted-ALOHA category is accepted without
    /// registering. Tal ids at or above broadcast are reserved.
    pub fn add_terminal(&mut self, tal_id: TalId) -> Result<()> {
        if tal_id >= BROADCAST_TAL_ID {
            log::error!("cannot register reserved terminal id {}", tal_id);
            return Err(Error::InvalidTalId(tal_id));
        }
        if self.terminals.contains_key(&tal_id) {
            log::warn!("duplicate terminal {}, considering it rebooted", tal_id);
            return Ok(());
        }
        let Some(label) = self.assign_category(tal_id)? else {
            log::info!("terminal {} does not use the random-access channel", tal_id);
            return Ok(());
        };
        if !self.categories.contains_key(label) {
            log::info!(
                "terminal {} is in category {} which has no random-access carriers",
                tal_id,
                label
            );
            return Ok(());
        }
        let label = label.to_string();
        log::info!("terminal {} joins category {}", tal_id, label);
        self.terminals.insert(tal_id, TerminalContext::new(tal_id, label));
        Ok(())
    }

    pub fn category(&self, label: &str) -> Option<&TerminalCategory> {
        self.categories.get(label)
    }

    pub fn category_mut(&mut self, label: &str) -> Option<&mut TerminalCategory> {
        self.categories.get_mut(label)
    }

    pub fn categories(&self) -> impl Iterator<Item = &TerminalCategory> {
        self.categories.values()
    }

    pub fn category_labels(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn terminal(&self, tal_id: TalId) -> Option<&TerminalContext> {
        self.terminals.get(&tal_id)
    }

    pub fn terminal_mut(&mut self, tal_id: TalId) -> Option<&mut TerminalContext> {
        self.terminals.get_mut(&tal_id)
    }

    /// Split borrow used by the schedule path, which walks a category's
    /// accepted packets while feeding terminal reassembly contexts.
    pub fn parts_mut(
        &mut self,
    ) -> (
        &mut BTreeMap<String, TerminalCategory>,
        &mut BTreeMap<TalId, TerminalContext>,
    ) {
        (&mut self.categories, &mut self.terminals)
    }
}
