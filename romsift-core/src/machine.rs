//! The `Machine` record: one installable game, BIOS, or device variant.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::name::{DumpStatus, parse_name};

/// One installable unit read from a romset catalog.
///
/// Identity fields (`name`, `title`, `disc_title`, `flags`, `regions`) are
/// derived from the catalog name at construction. Descriptive attributes are
/// filled in by metadata sources before filtering and are read-only after.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Unique name within the romset, including any variant tags.
    pub name: String,
    /// Name with every tag stripped.
    pub title: String,
    /// Title plus the disc tag only.
    pub disc_title: String,
    /// Catalog description, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// System this machine was loaded for (e.g. "nes", "arcade").
    pub system: String,
    /// Romset this machine was read from.
    pub romset: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bios_name: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub device_names: BTreeSet<String>,

    /// Raw tags from the name, e.g. `["USA", "Rev 1"]`.
    pub flags: Vec<String>,
    pub regions: Vec<String>,
    /// `Rev X` tag, or the `vX.Y` version tag when there is none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    pub dump_status: DumpStatus,

    pub is_bios: bool,
    pub is_device: bool,
    pub runnable: bool,
    pub mechanical: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub controls: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub genres: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub languages: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emulator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emulator_rating: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub developers: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub publishers: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub collections: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orientation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual: Option<Manual>,
    pub favorite: bool,

    /// Canonical family this machine belongs to. Defaults to the title until
    /// group resolution runs.
    pub group_name: String,
}

/// A manual available for a machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manual {
    /// Language code → URL of the manual in that language.
    pub urls: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Machine {
    /// Create a machine from its catalog name, deriving title, disc title,
    /// flags, regions and languages from the name's tags.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let parsed = parse_name(&name);
        Self {
            disc_title: parsed.disc_title(),
            group_name: parsed.title.clone(),
            title: parsed.title,
            flags: parsed.tags,
            regions: parsed.regions,
            revision: parsed.revision.or(parsed.version),
            dump_status: parsed.status,
            languages: parsed.languages.iter().map(|l| l.to_lowercase()).collect(),
            runnable: true,
            name,
            ..Default::default()
        }
    }

    pub fn with_romset(mut self, system: impl Into<String>, romset: impl Into<String>) -> Self {
        self.system = system.into();
        self.romset = romset.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_name = Some(parent.into());
        self
    }

    pub fn with_bios(mut self, bios: impl Into<String>) -> Self {
        self.bios_name = Some(bios.into());
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device_names.insert(device.into());
        self
    }

    /// True when this machine is a clone of another machine.
    pub fn is_clone(&self) -> bool {
        self.parent_name.is_some()
    }

    /// True when this machine is one disc of a multi-disc playlist.
    pub fn is_playlist_member(&self) -> bool {
        self.disc_title != self.title
    }

    /// Names of every machine this one depends on, in parent, BIOS, device order.
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.parent_name
            .iter()
            .chain(self.bios_name.iter())
            .chain(self.device_names.iter())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_identity_from_name() {
        let m = Machine::new("Final Fantasy VII (USA) (Disc 2) (En,Fr)");
        assert_eq!(m.title, "Final Fantasy VII");
        assert_eq!(m.disc_title, "Final Fantasy VII (Disc 2)");
        assert_eq!(m.group_name, "Final Fantasy VII");
        assert_eq!(m.regions, vec!["USA"]);
        assert!(m.languages.contains("en"));
        assert!(m.is_playlist_member());
        assert!(m.runnable);
    }

    #[test]
    fn dependency_names_in_order() {
        let m = Machine::new("sf2ce")
            .with_parent("sf2")
            .with_bios("cpsbios")
            .with_device("z80")
            .with_device("qsound");
        let deps: Vec<&str> = m.dependency_names().collect();
        assert_eq!(deps, vec!["sf2", "cpsbios", "qsound", "z80"]);
        assert!(m.is_clone());
    }
}
