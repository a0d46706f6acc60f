use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use romsift_lib::{
    CancelFlag, DirectorySynchronizer, HttpDownloader, InstallError, InstallOptions,
    InstallOutcome, InstallStatus, Installer, LocalFileSystem, Settings,
};

use crate::cli_types::SystemArgs;
use crate::commands::{finish, open_session};
use crate::error::CliError;
use crate::progress::InstallProgress;

pub(crate) fn install_options(
    settings: &Settings,
    workers: Option<usize>,
    force: bool,
) -> InstallOptions {
    InstallOptions {
        workers: workers.unwrap_or(settings.workers).max(1),
        attempts: settings.retries.max(1),
        retry_delay: Duration::from_secs(settings.retry_delay_secs),
        force,
    }
}

/// Run the install command.
pub(crate) fn run_install(
    config: Option<PathBuf>,
    systems: SystemArgs,
    force: bool,
    workers: Option<usize>,
    no_organize: bool,
    quiet: bool,
) -> Result<(), CliError> {
    let session = open_session(config, &systems)?;
    let settings = &session.config.settings;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::runtime(format!("Failed to create tokio runtime: {e}")))?;

    let cancel = CancelFlag::new();
    let on_interrupt = cancel.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing running installs");
            on_interrupt.cancel();
        }
    });

    let mut selection = session.select(&cancel)?;
    let mut report = std::mem::take(&mut selection.report);
    let tasks = session.pipeline.install_tasks(&selection);
    if tasks.is_empty() {
        log::info!("Nothing selected");
        return finish(&report);
    }

    let downloader = HttpDownloader::new(Duration::from_secs(settings.connect_timeout_secs))
        .map_err(|e| CliError::runtime(format!("HTTP client: {e}")))?;
    let installer = Installer::new(
        Arc::new(downloader),
        install_options(settings, workers, force),
        cancel.clone(),
    );

    let progress = InstallProgress::new(tasks.len() as u64, quiet);
    let outcomes = rt.block_on(installer.run(tasks, |outcome| progress.record(outcome)));
    progress.finish();

    let mut installed = 0;
    let mut present = 0;
    let mut cancelled = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(InstallStatus::Installed) => installed += 1,
            Ok(InstallStatus::AlreadyPresent) => present += 1,
            Err(InstallError::Cancelled) => cancelled += 1,
            Err(e) => report.failures.push((outcome.machine, e.to_string())),
        }
    }
    log::info!(
        "{} installed, {} already present, {} failed",
        installed.if_supports_color(Stderr, |t| t.green()),
        present,
        report.failures.len(),
    );

    if cancelled > 0 || cancel.is_cancelled() {
        log::warn!("{cancelled} install(s) cancelled");
        report.log_summary();
        return Err(CliError::Cancelled);
    }

    if !no_organize {
        let sync = DirectorySynchronizer::new(LocalFileSystem);
        session.pipeline.organize(&selection, &sync, &mut report);
    }

    finish(&report)
}

pub(crate) fn describe(outcome: &InstallOutcome) -> String {
    match &outcome.result {
        Ok(InstallStatus::Installed) if outcome.attempts > 1 => {
            format!("{} (after {} attempts)", outcome.machine, outcome.attempts)
        }
        Ok(InstallStatus::Installed) => outcome.machine.clone(),
        Ok(InstallStatus::AlreadyPresent) => format!("{} (present)", outcome.machine),
        Err(e) => format!("{}: {e}", outcome.machine),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workers_flag_overrides_settings() {
        let settings = Settings::default();
        assert_eq!(install_options(&settings, None, false).workers, settings.workers);
        assert_eq!(install_options(&settings, Some(8), true).workers, 8);
        assert_eq!(install_options(&settings, Some(0), false).workers, 1);
        assert!(install_options(&settings, None, true).force);
    }

    #[test]
    fn describe_mentions_retries() {
        let outcome = InstallOutcome {
            machine: "Zelda (USA)".to_string(),
            target: PathBuf::from("/roms/Zelda (USA).zip"),
            attempts: 2,
            result: Ok(InstallStatus::Installed),
        };
        assert_eq!(describe(&outcome), "Zelda (USA) (after 2 attempts)");
    }
}
