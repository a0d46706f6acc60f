use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use romsift_lib::{CancelFlag, removal_command};

use crate::cli_types::SystemArgs;
use crate::commands::{finish, open_session};
use crate::error::CliError;

/// Print `rm` commands for installed files that no selected machine uses.
/// Nothing is deleted.
pub(crate) fn run_vacuum(config: Option<PathBuf>, systems: SystemArgs) -> Result<(), CliError> {
    let session = open_session(config, &systems)?;
    let selection = session.select(&CancelFlag::new())?;
    let unreferenced = session.pipeline.vacuum(&selection)?;

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for path in &unreferenced {
        writeln!(out, "{}", removal_command(path))?;
    }
    out.flush()?;

    log::info!("{} unreferenced file(s)", unreferenced.len());
    finish(&selection.report)
}
