use std::path::PathBuf;

use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use romsift_filter::{SortOrder, SortSpec};
use romsift_lib::config_path;

use crate::commands::load_config;
use crate::error::CliError;

fn describe_sort(spec: &SortSpec) -> String {
    match spec {
        SortSpec::Order(SortOrder::Ascending) => "ascending".to_string(),
        SortSpec::Order(SortOrder::Descending) => "descending".to_string(),
        SortSpec::Values(values) => values.join(", "),
    }
}

/// Print the config file path.
pub(crate) fn run_config_path(cli_path: Option<PathBuf>) {
    println!("{}", config_path(cli_path).display());
}

/// Show the systems and settings a config resolves to, defaults applied.
pub(crate) fn run_config_show(cli_path: Option<PathBuf>) -> Result<(), CliError> {
    let (path, config) = load_config(cli_path)?;
    let settings = &config.settings;

    log::info!(
        "{}",
        "romsift configuration".if_supports_color(Stderr, |t| t.bold())
    );
    log::info!("");
    log::info!(
        "  Config file: {}",
        path.display().if_supports_color(Stderr, |t| t.cyan())
    );
    log::info!(
        "  Workers: {}, attempts: {}, retry delay: {}s, connect timeout: {}s",
        settings.workers,
        settings.retries,
        settings.retry_delay_secs,
        settings.connect_timeout_secs
    );
    log::info!("  Downloads: {}", settings.download_dir().display());

    for system in &config.systems {
        log::info!("");
        log::info!("{}:", system.name.if_supports_color(Stderr, |t| t.bold()));
        for romset in &system.romsets {
            log::info!(
                "  romset {} [{}] {}",
                romset.name.if_supports_color(Stderr, |t| t.bold()),
                romset.install.if_supports_color(Stderr, |t| t.cyan()),
                romset.catalog.display()
            );
            log::info!("    target: {}", romset.target);
            if let Some(source) = &romset.source {
                log::info!("    source: {source}");
            }
        }
        for (key, values) in &system.filters {
            log::info!("  filter {key} = {}", values.join(", "));
        }
        for (key, values) in &system.favorites {
            log::info!("  favorite {key} = {}", values.join(", "));
        }
        if let Some(group_by) = &system.priority.group_by {
            log::info!("  group by {group_by}");
        }
        for (key, spec) in &system.priority.order {
            log::info!("  priority {key} = {}", describe_sort(spec));
        }
        for dir in &system.dirs {
            log::info!(
                "  dir {} ({}{})",
                dir.path.display().if_supports_color(Stderr, |t| t.cyan()),
                dir.file,
                if dir.relative { ", relative" } else { "" }
            );
        }
    }
    Ok(())
}
