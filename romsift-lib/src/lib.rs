//! Orchestration for romsift: grouping, dependency closure, configuration,
//! installation, directory synchronization and the pipeline tying them
//! together.

pub mod closure;
pub mod config;
pub mod grouping;
pub mod install;
pub mod pipeline;
pub mod report;
pub mod sync;
pub mod template;
pub mod vacuum;
pub mod worker_pool;

pub use closure::{Closure, compute_closure};
pub use config::{
    CONFIG_ENV, Config, ConfigLoadError, DirConfig, ExpressionMap, MetadataConfig, MetadataKind,
    PriorityConfig, RomsetConfig, Settings, SystemConfig, config_path, merge_expressions,
};
pub use grouping::assign_groups;
pub use install::{
    ActionRegistry, CancelFlag, CopyAction, DEFAULT_ACTION, Downloader, HttpDownloader,
    InstallAction, InstallError, InstallOptions, InstallOutcome, InstallStatus, InstallTask,
    Installer, MoveAction, NoAction,
};
pub use pipeline::{
    DEFAULT_GROUP_BY, Pipeline, PipelineError, RomsetPlan, Selected, Selection, SystemPlan,
    SystemSelection,
};
pub use report::{DependencyKind, PipelineReport, Warning};
pub use sync::{
    DirectorySynchronizer, EntryKind, FileSystem, LocalFileSystem, SyncEntry, SyncSummary,
    SystemDir,
};
pub use template::{PLAYLIST_EXTENSION, Template, strip_disc_tag};
pub use vacuum::{plan_vacuum, removal_command};
pub use worker_pool::WorkerPool;
