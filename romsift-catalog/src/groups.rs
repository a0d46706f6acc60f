//! Group override table: hand-curated merges and splits of machine families.

use std::collections::{BTreeMap, HashMap};

use regex::{Regex, RegexBuilder};
use romsift_core::{ConfigError, Machine};
use serde::Deserialize;

/// Group overrides as written in configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupOverrides {
    /// Machine name or disc title → group it is merged into.
    #[serde(default)]
    pub merge: BTreeMap<String, String>,
    /// Sub-groups carved out of a title by a flag pattern.
    #[serde(default)]
    pub split: Vec<SplitRule>,
}

/// Moves machines of `title` whose flags match `flags` into `group`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitRule {
    pub title: String,
    pub flags: String,
    pub group: String,
}

#[derive(Debug, Clone)]
struct CompiledSplit {
    title: String,
    pattern: Regex,
    group: String,
}

/// Compiled form of [`GroupOverrides`].
#[derive(Debug, Clone, Default)]
pub struct GroupTable {
    merge: HashMap<String, String>,
    splits: Vec<CompiledSplit>,
}

impl GroupTable {
    pub fn new(overrides: &GroupOverrides) -> Result<Self, ConfigError> {
        let splits = overrides
            .split
            .iter()
            .map(|rule| {
                let pattern = RegexBuilder::new(&rule.flags)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ConfigError::InvalidPattern {
                        pattern: rule.flags.clone(),
                        source,
                    })?;
                Ok(CompiledSplit {
                    title: rule.title.to_lowercase(),
                    pattern,
                    group: rule.group.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self {
            merge: overrides.merge.clone().into_iter().collect(),
            splits,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.merge.is_empty() && self.splits.is_empty()
    }

    /// Explicit merge target for a machine, by name and then disc title.
    pub fn merged_group(&self, machine: &Machine) -> Option<&str> {
        self.merge
            .get(&machine.name)
            .or_else(|| self.merge.get(&machine.disc_title))
            .map(String::as_str)
    }

    /// Split target for a machine whose title and flags match a split rule.
    pub fn split_group(&self, machine: &Machine) -> Option<&str> {
        let title = machine.title.to_lowercase();
        self.splits
            .iter()
            .find(|split| {
                split.title == title && machine.flags.iter().any(|f| split.pattern.is_match(f))
            })
            .map(|split| split.group.as_str())
    }
}
