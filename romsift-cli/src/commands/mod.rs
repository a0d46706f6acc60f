pub(crate) mod config;
pub(crate) mod install;
pub(crate) mod list;
pub(crate) mod organize;
pub(crate) mod vacuum;

use std::path::PathBuf;

use romsift_core::AttributeRegistry;
use romsift_lib::{
    ActionRegistry, CancelFlag, Config, Pipeline, PipelineError, PipelineReport, Selection,
    config_path,
};

use crate::cli_types::SystemArgs;
use crate::error::CliError;

/// A loaded config and the pipeline compiled from it.
pub(crate) struct Session {
    pub config: Config,
    pub pipeline: Pipeline,
}

pub(crate) fn load_config(cli_path: Option<PathBuf>) -> Result<(PathBuf, Config), CliError> {
    let path = config_path(cli_path);
    log::debug!("Loading config from {}", path.display());
    let config = Config::load(&path).map_err(|e| CliError::config(&path, e))?;
    Ok((path, config))
}

/// Load the config and compile the requested systems.
pub(crate) fn open_session(
    cli_path: Option<PathBuf>,
    systems: &SystemArgs,
) -> Result<Session, CliError> {
    let (path, config) = load_config(cli_path)?;
    let registry = AttributeRegistry::standard();
    let actions = ActionRegistry::standard();
    let pipeline = Pipeline::from_config(&config, &registry, &actions, &systems.systems)
        .map_err(|e| match e {
            PipelineError::Load(source) => CliError::config(&path, source),
            other => other.into(),
        })?;
    Ok(Session { config, pipeline })
}

impl Session {
    pub(crate) fn select(&self, cancel: &CancelFlag) -> Result<Selection, CliError> {
        match self.pipeline.select(cancel) {
            Ok(selection) => Ok(selection),
            Err(PipelineError::Cancelled) => Err(CliError::Cancelled),
            Err(e) => Err(e.into()),
        }
    }
}

/// Log the report and turn recorded failures into an error.
pub(crate) fn finish(report: &PipelineReport) -> Result<(), CliError> {
    report.log_summary();
    if report.has_failures() {
        return Err(CliError::Failed(report.failures.len()));
    }
    Ok(())
}
