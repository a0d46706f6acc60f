//! Per-run counters and recovered problems.

use std::fmt;
use std::path::PathBuf;

/// Which reference a dependency was reached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Parent,
    Bios,
    Device,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parent => write!(f, "parent"),
            Self::Bios => write!(f, "bios"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// A data problem that was logged and worked around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A parent/bios/device reference names a machine missing from the romset.
    DanglingReference {
        machine: String,
        kind: DependencyKind,
        target: String,
    },
    /// Parent links loop back on themselves.
    ParentCycle { machine: String },
    /// A catalog record could not be read.
    SkippedRecord { romset: String, message: String },
    /// A metadata source failed for one machine.
    Metadata {
        machine: String,
        source: String,
        message: String,
    },
    /// A selected machine has no installed file yet.
    NotInstalled { machine: String, path: PathBuf },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingReference {
                machine,
                kind,
                target,
            } => write!(f, "{machine}: {kind} '{target}' not found"),
            Self::ParentCycle { machine } => write!(f, "{machine}: parent chain loops"),
            Self::SkippedRecord { romset, message } => {
                write!(f, "{romset}: skipped record ({message})")
            }
            Self::Metadata {
                machine,
                source,
                message,
            } => write!(f, "{machine}: metadata from {source} failed ({message})"),
            Self::NotInstalled { machine, path } => {
                write!(f, "{machine}: not installed at {}", path.display())
            }
        }
    }
}

/// Summary of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Machines read from catalogs.
    pub candidates: usize,
    /// Machines that passed filtering.
    pub passing: usize,
    /// Machines chosen by prioritization.
    pub selected: usize,
    /// Machines kept only because something selected depends on them.
    pub dependencies: usize,
    pub warnings: Vec<Warning>,
    /// Machine name and error for every failed install.
    pub failures: Vec<(String, String)>,
}

impl PipelineReport {
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn merge(&mut self, other: PipelineReport) {
        self.candidates += other.candidates;
        self.passing += other.passing;
        self.selected += other.selected;
        self.dependencies += other.dependencies;
        self.warnings.extend(other.warnings);
        self.failures.extend(other.failures);
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn log_summary(&self) {
        log::info!(
            "{} candidates, {} passing, {} selected, {} dependencies",
            self.candidates,
            self.passing,
            self.selected,
            self.dependencies
        );
        if !self.warnings.is_empty() {
            log::info!("{} warnings", self.warnings.len());
        }
        for (machine, error) in &self.failures {
            log::error!("{machine}: {error}");
        }
    }
}
