//! The curation pipeline: catalogs in, selected machines out.
//!
//! Per system, in order:
//! 1. read every romset's catalog, applying metadata sources and the
//!    favorites ruleset to each machine as it streams in
//! 2. resolve groups over all machines of the system
//! 3. filter each machine with its romset's ruleset
//! 4. keep the best machine of every group
//! 5. add the parents, BIOSes and devices the winners need
//!
//! Everything configurable is compiled up front by [`Pipeline::from_config`],
//! so a bad rule or template fails before any catalog is read.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use romsift_catalog::{
    CatalogError, CatalogSource, DatCatalog, GroupTable, MetadataSource, MetadataTable,
};
use romsift_core::{AttributeRegistry, ConfigError, Machine};
use romsift_filter::{CompositeSorter, GroupKey, Ruleset, SortableSet};
use thiserror::Error;

use crate::closure::compute_closure;
use crate::config::{Config, ConfigLoadError, ExpressionMap, MetadataKind, SystemConfig};
use crate::grouping::assign_groups;
use crate::install::{ActionRegistry, CancelFlag, InstallAction, InstallTask};
use crate::report::{PipelineReport, Warning};
use crate::sync::{DirectorySynchronizer, EntryKind, FileSystem, SyncEntry, SyncSummary, SystemDir};
use crate::template::Template;
use crate::vacuum::plan_vacuum;

/// Attribute keying groups when a system doesn't name one.
pub const DEFAULT_GROUP_BY: &str = "groups";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] ConfigLoadError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Cannot scan installed files: {0}")]
    Scan(#[source] io::Error),

    #[error("Cancelled")]
    Cancelled,
}

/// A romset ready to read.
pub struct RomsetPlan {
    pub name: String,
    pub catalog: Box<dyn CatalogSource>,
    /// System filters layered with the romset's own.
    pub rules: Ruleset,
    pub source: Option<Template>,
    pub target: Template,
    pub action: Arc<dyn InstallAction>,
}

/// A system ready to run.
pub struct SystemPlan {
    pub name: String,
    pub favorites: Ruleset,
    pub sorter: CompositeSorter,
    pub group_key: GroupKey,
    pub groups: GroupTable,
    pub metadata: Vec<Box<dyn MetadataSource>>,
    pub romsets: Vec<RomsetPlan>,
    pub dirs: Vec<SystemDir>,
}

/// A machine chosen for installation.
#[derive(Debug, Clone)]
pub struct Selected {
    pub machine: Machine,
    /// Kept only because another selected machine needs it.
    pub dependency: bool,
    pub source: Option<String>,
    pub target: PathBuf,
    romset: usize,
}

/// Selected machines of one system, winners first, then dependencies.
#[derive(Debug, Clone, Default)]
pub struct SystemSelection {
    pub system: String,
    pub machines: Vec<Selected>,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub systems: Vec<SystemSelection>,
    pub report: PipelineReport,
}

impl Selection {
    pub fn machines(&self) -> impl Iterator<Item = (&str, &Selected)> {
        self.systems
            .iter()
            .flat_map(|s| s.machines.iter().map(move |m| (s.system.as_str(), m)))
    }

    pub fn len(&self) -> usize {
        self.systems.iter().map(|s| s.machines.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct Pipeline {
    systems: Vec<SystemPlan>,
    download_dir: PathBuf,
    /// Targets of configured systems left out of this run, bound to their
    /// system and romset names. Vacuum never touches files they match.
    other_targets: Vec<Template>,
}

fn ruleset(registry: &AttributeRegistry, map: &ExpressionMap) -> Result<Ruleset, ConfigError> {
    Ruleset::from_expressions(registry, map.iter().map(|(k, v)| (k.as_str(), v)))
}

impl Pipeline {
    pub fn new(systems: Vec<SystemPlan>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            systems,
            download_dir: download_dir.into(),
            other_targets: Vec::new(),
        }
    }

    /// Compile a config, keeping only `only` systems when it is non-empty.
    /// Metadata files are loaded here.
    pub fn from_config(
        config: &Config,
        registry: &AttributeRegistry,
        actions: &ActionRegistry,
        only: &[String],
    ) -> Result<Self, PipelineError> {
        let mut systems = Vec::new();
        let mut other_targets = Vec::new();
        for system in &config.systems {
            if !only.is_empty() && !only.contains(&system.name) {
                for romset in &system.romsets {
                    match romset.target.parse::<Template>() {
                        Ok(target) => other_targets.push(target.bind(&system.name, &romset.name)),
                        Err(e) => log::debug!("{}: {e}", system.name),
                    }
                }
                continue;
            }
            systems.push(Self::plan_system(system, registry, actions)?);
        }
        for name in only {
            if config.system(name).is_none() {
                let message = format!("no system named '{name}'");
                return Err(ConfigLoadError::invalid("systems", message).into());
            }
        }
        let mut pipeline = Self::new(systems, config.settings.download_dir());
        pipeline.other_targets = other_targets;
        Ok(pipeline)
    }

    fn plan_system(
        system: &SystemConfig,
        registry: &AttributeRegistry,
        actions: &ActionRegistry,
    ) -> Result<SystemPlan, PipelineError> {
        let filters = ruleset(registry, &system.filters)?;

        let mut seen = HashSet::new();
        for romset in &system.romsets {
            if !seen.insert(romset.name.as_str()) {
                return Err(ConfigLoadError::invalid(
                    format!("systems.{}.romsets", system.name),
                    format!("duplicate romset '{}'", romset.name),
                )
                .into());
            }
        }

        let romsets = system
            .romsets
            .iter()
            .map(|r| {
                let mut rules = filters.clone();
                rules.extend(ruleset(registry, &r.filters)?);
                Ok(RomsetPlan {
                    name: r.name.clone(),
                    catalog: Box::new(DatCatalog::new(&r.catalog, &system.name, &r.name))
                        as Box<dyn CatalogSource>,
                    rules,
                    source: r.source.as_deref().map(str::parse::<Template>).transpose()?,
                    target: r.target.parse::<Template>()?,
                    action: actions.resolve(&r.install)?,
                })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let metadata = system
            .metadata
            .iter()
            .map(|m| {
                let table = match m.kind {
                    MetadataKind::Json => MetadataTable::load_json(&m.path, registry)?,
                    MetadataKind::Csv => MetadataTable::load_csv(&m.path, registry)?,
                };
                log::debug!("{}: {} metadata entries", m.path.display(), table.len());
                Ok(Box::new(table) as Box<dyn MetadataSource>)
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;

        let dirs = system
            .dirs
            .iter()
            .map(|d| {
                Ok(SystemDir {
                    path: d.path.clone(),
                    file: d.file.parse()?,
                    relative: d.relative,
                    rules: ruleset(registry, &d.filters)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let group_by = system.priority.group_by.as_deref().unwrap_or(DEFAULT_GROUP_BY);
        Ok(SystemPlan {
            name: system.name.clone(),
            favorites: ruleset(registry, &system.favorites)?.with_default(None),
            sorter: CompositeSorter::from_expressions(
                registry,
                system.priority.order.iter().map(|(k, s)| (k.as_str(), s)),
            )?,
            group_key: GroupKey::from_attribute(registry, group_by)?,
            groups: GroupTable::new(&system.groups)?,
            metadata,
            romsets,
            dirs,
        })
    }

    pub fn systems(&self) -> &[SystemPlan] {
        &self.systems
    }

    /// Run filtering, prioritization and closure for every system.
    pub fn select(&self, cancel: &CancelFlag) -> Result<Selection, PipelineError> {
        let mut selection = Selection::default();
        for system in &self.systems {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let (machines, report) = select_system(system, cancel)?;
            selection.report.merge(report);
            selection.systems.push(SystemSelection {
                system: system.name.clone(),
                machines,
            });
        }
        Ok(selection)
    }

    /// Install tasks for every selected machine, in selection order.
    pub fn install_tasks(&self, selection: &Selection) -> Vec<InstallTask> {
        let mut tasks = Vec::new();
        for (system, selected) in self.systems.iter().zip(&selection.systems) {
            for entry in &selected.machines {
                let romset = &system.romsets[entry.romset];
                let download = match &entry.source {
                    Some(url) => {
                        let file = url.rsplit('/').next().unwrap_or(url.as_str());
                        self.download_dir
                            .join(&system.name)
                            .join(&romset.name)
                            .join(file)
                    }
                    None => entry.target.clone(),
                };
                tasks.push(InstallTask {
                    machine: entry.machine.name.clone(),
                    archive_key: entry
                        .source
                        .clone()
                        .unwrap_or_else(|| entry.target.to_string_lossy().into_owned()),
                    source: entry.source.clone(),
                    download,
                    target: entry.target.clone(),
                    action: romset.action.clone(),
                });
            }
        }
        tasks
    }

    /// Reconcile every configured directory with the installed part of the
    /// selection. A failing directory is recorded and the rest continue.
    pub fn organize<F: FileSystem>(
        &self,
        selection: &Selection,
        sync: &DirectorySynchronizer<F>,
        report: &mut PipelineReport,
    ) -> Vec<(PathBuf, SyncSummary)> {
        let mut summaries = Vec::new();
        for (system, selected) in self.systems.iter().zip(&selection.systems) {
            if system.dirs.is_empty() {
                continue;
            }
            let mut entries = Vec::new();
            for entry in &selected.machines {
                match sync.fs().entry_kind(&entry.target) {
                    Ok(Some(EntryKind::File | EntryKind::Symlink)) => entries.push(SyncEntry {
                        machine: &entry.machine,
                        installed: &entry.target,
                    }),
                    _ => report.warn(Warning::NotInstalled {
                        machine: entry.machine.name.clone(),
                        path: entry.target.clone(),
                    }),
                }
            }

            for dir in &system.dirs {
                match sync.reconcile(dir, &entries) {
                    Ok(summary) => {
                        log::info!(
                            "{}: {} created, {} removed, {} unchanged",
                            dir.path.display(),
                            summary.created.len(),
                            summary.removed.len(),
                            summary.unchanged
                        );
                        summaries.push((dir.path.clone(), summary));
                    }
                    Err(e) => {
                        log::error!("{}: {e}", dir.path.display());
                        report
                            .failures
                            .push((dir.path.display().to_string(), e.to_string()));
                    }
                }
            }
        }
        summaries
    }

    /// Installed files no selected machine references.
    pub fn vacuum(&self, selection: &Selection) -> Result<Vec<PathBuf>, PipelineError> {
        let keep: HashSet<PathBuf> = selection
            .machines()
            .map(|(_, selected)| selected.target.clone())
            .collect();
        let templates: Vec<Template> = self
            .systems
            .iter()
            .flat_map(|s| s.romsets.iter().map(move |r| r.target.bind(&s.name, &r.name)))
            .collect();
        plan_vacuum(&templates, &keep, &self.other_targets).map_err(PipelineError::Scan)
    }
}

fn select_system(
    system: &SystemPlan,
    cancel: &CancelFlag,
) -> Result<(Vec<Selected>, PipelineReport), PipelineError> {
    let mut report = PipelineReport::default();
    let mut machines = Vec::new();
    let mut romset_of = Vec::new();

    for (index, romset) in system.romsets.iter().enumerate() {
        log::info!("{}: reading {}", system.name, romset.catalog.name());
        for item in romset.catalog.machines()? {
            let mut machine = match item {
                Ok(machine) => machine,
                Err(e) if e.is_recoverable() => {
                    report.warn(Warning::SkippedRecord {
                        romset: romset.name.clone(),
                        message: e.to_string(),
                    });
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            for source in &system.metadata {
                if let Err(e) = source.update(&mut machine) {
                    report.warn(Warning::Metadata {
                        machine: machine.name.clone(),
                        source: source.name().to_string(),
                        message: e.to_string(),
                    });
                }
            }
            // Selected machines are mapped back to their romset plan by name.
            machine.romset.clone_from(&romset.name);
            machine.favorite = system.favorites.evaluate(&machine).is_some();
            machines.push(machine);
            romset_of.push(index);
        }
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
    }
    report.candidates = machines.len();

    for warning in assign_groups(&mut machines, &system.groups) {
        report.warn(warning);
    }

    let mut set = SortableSet::new(&system.sorter, system.group_key.clone());
    for (machine, &romset) in machines.iter().zip(&romset_of) {
        if let Some(reason) = system.romsets[romset].rules.evaluate(machine) {
            report.passing += 1;
            set.add(machine, reason);
        }
    }
    let winners = set.select();
    report.selected = winners.len();

    let closure = compute_closure(&winners, &machines);
    report.dependencies = closure.dependencies;
    // Grouping already reported dangling parents.
    for warning in &closure.warnings {
        if !report.warnings.contains(warning) {
            report.warn(warning.clone());
        }
    }

    let romset_index: HashMap<&str, usize> = system
        .romsets
        .iter()
        .enumerate()
        .map(|(i, r)| (r.name.as_str(), i))
        .collect();
    let selected = closure
        .machines
        .iter()
        .enumerate()
        .map(|(i, machine)| {
            let Some(&romset) = romset_index.get(machine.romset.as_str()) else {
                let message = format!("{} has unknown romset '{}'", machine.name, machine.romset);
                return Err(ConfigLoadError::invalid(format!("systems.{}", system.name), message));
            };
            let plan = &system.romsets[romset];
            Ok(Selected {
                machine: (*machine).clone(),
                dependency: closure.is_dependency(i),
                source: plan.source.as_ref().map(|t| t.render(machine)),
                target: plan.target.render_path(machine),
                romset,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    log::info!(
        "{}: {} of {} machines selected, {} dependencies",
        system.name,
        report.selected,
        report.candidates,
        report.dependencies
    );
    Ok((selected, report))
}

#[cfg(test)]
#[path = "tests/pipeline_tests.rs"]
mod tests;
