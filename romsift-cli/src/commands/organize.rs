use std::path::PathBuf;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use romsift_lib::{CancelFlag, DirectorySynchronizer, LocalFileSystem};

use crate::cli_types::SystemArgs;
use crate::commands::{finish, open_session};
use crate::error::CliError;

/// Re-run directory synchronization for installed machines without downloading.
pub(crate) fn run_organize(config: Option<PathBuf>, systems: SystemArgs) -> Result<(), CliError> {
    let session = open_session(config, &systems)?;
    let mut selection = session.select(&CancelFlag::new())?;
    let mut report = std::mem::take(&mut selection.report);

    let sync = DirectorySynchronizer::new(LocalFileSystem);
    let summaries = session.pipeline.organize(&selection, &sync, &mut report);
    for (path, summary) in &summaries {
        if summary.changes() == 0 {
            log::debug!("{}: up to date", path.display());
            continue;
        }
        for link in &summary.created {
            log::info!(
                "  {} {}",
                "+".if_supports_color(Stderr, |t| t.green()),
                link.display()
            );
        }
        for link in &summary.removed {
            log::info!(
                "  {} {}",
                "-".if_supports_color(Stderr, |t| t.red()),
                link.display()
            );
        }
        for playlist in &summary.playlists {
            log::info!("  {} {}", "*".if_supports_color(Stderr, |t| t.cyan()), playlist.display());
        }
    }

    finish(&report)
}
