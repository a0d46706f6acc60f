//! One-game-one-rom selection.
//!
//! A [`SortableSet`] collects qualifying machines into groups and keeps the
//! best-ranked machine of each group. A machine admitted by a name override
//! locks its group: later candidates are remembered but never compared.
//!
//! When a group's winner is one disc of a multi-disc playlist, the group is
//! re-partitioned by disc title and one machine is selected per disc.

use std::collections::HashMap;
use std::sync::Arc;

use romsift_core::{Attribute, AttributeRegistry, AttributeValue, ConfigError, Machine};

use crate::ruleset::FilterReason;
use crate::sorter::{CompositeSorter, SortKey};

/// How machines are keyed into groups.
#[derive(Debug, Clone)]
pub enum GroupKey {
    /// The value of an attribute (usually `groups`).
    Attribute(Arc<dyn Attribute>),
    /// The machine's disc title. Used when splitting a playlist into discs.
    DiscTitle,
}

impl GroupKey {
    pub fn from_attribute(registry: &AttributeRegistry, name: &str) -> Result<Self, ConfigError> {
        Ok(Self::Attribute(registry.resolve(name)?))
    }

    /// The group key for a machine. A missing value puts the machine in a
    /// group of its own.
    pub fn key(&self, machine: &Machine) -> String {
        match self {
            Self::DiscTitle => machine.disc_title.clone(),
            Self::Attribute(attribute) => match attribute.get(machine) {
                value if value.is_null() => machine.name.clone(),
                AttributeValue::Text(s) => s,
                other => other.match_values().join(","),
            },
        }
    }
}

#[derive(Debug)]
struct Slot<'a> {
    best: &'a Machine,
    best_key: SortKey,
    locked: bool,
    members: Vec<(&'a Machine, FilterReason)>,
}

/// Groups of candidate machines, each tracking its current best.
#[derive(Debug)]
pub struct SortableSet<'a> {
    sorter: &'a CompositeSorter,
    group_key: GroupKey,
    expand_playlists: bool,
    slots: Vec<Slot<'a>>,
    index: HashMap<String, usize>,
}

impl<'a> SortableSet<'a> {
    pub fn new(sorter: &'a CompositeSorter, group_key: GroupKey) -> Self {
        Self {
            sorter,
            group_key,
            expand_playlists: true,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Select a single machine per group even when it belongs to a playlist.
    pub fn without_playlist_expansion(mut self) -> Self {
        self.expand_playlists = false;
        self
    }

    /// Number of groups seen so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Offer a machine that passed filtering.
    pub fn add(&mut self, machine: &'a Machine, reason: FilterReason) {
        let key = self.group_key.key(machine);
        let locks = reason == FilterReason::Override;

        let Some(&i) = self.index.get(&key) else {
            self.index.insert(key, self.slots.len());
            self.slots.push(Slot {
                best: machine,
                best_key: self.sorter.sort_key(machine),
                locked: locks,
                members: vec![(machine, reason)],
            });
            return;
        };

        let slot = &mut self.slots[i];
        slot.members.push((machine, reason));
        if slot.locked {
            log::trace!("{} kept {} (locked by override)", key, slot.best.name);
            return;
        }

        let candidate_key = self.sorter.sort_key(machine);
        if locks || candidate_key < slot.best_key {
            slot.best = machine;
            slot.best_key = candidate_key;
            slot.locked = locks;
        }
    }

    /// The selected machines, in the order their groups were first seen.
    pub fn select(self) -> Vec<&'a Machine> {
        let mut selected = Vec::with_capacity(self.slots.len());
        for slot in self.slots {
            if slot.members.len() == 1 || !self.expand_playlists || !slot.best.is_playlist_member()
            {
                selected.push(slot.best);
                continue;
            }

            let mut discs = SortableSet::new(self.sorter, GroupKey::DiscTitle)
                .without_playlist_expansion();
            // The locked winner is offered first so it keeps its disc.
            let winner_reason = if slot.locked {
                FilterReason::Override
            } else {
                FilterReason::Allow
            };
            discs.add(slot.best, winner_reason);
            for (machine, reason) in slot.members {
                if machine.is_playlist_member() && !std::ptr::eq(machine, slot.best) {
                    discs.add(machine, reason);
                }
            }
            log::debug!("{} expands to {} discs", slot.best.title, discs.len());
            selected.extend(discs.select());
        }
        selected
    }
}

#[cfg(test)]
#[path = "tests/prioritizer_tests.rs"]
mod tests;
