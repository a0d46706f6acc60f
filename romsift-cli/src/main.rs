//! romsift CLI
//!
//! Command-line interface for filtering, prioritizing and installing romsets.

mod cli_types;
mod commands;
mod error;
mod logging;
mod progress;

use std::process::ExitCode;

use clap::Parser;

use cli_types::{Cli, Commands, ConfigAction};
use commands::config::{run_config_path, run_config_show};
use commands::install::run_install;
use commands::list::run_list;
use commands::organize::run_organize;
use commands::vacuum::run_vacuum;
use error::CliError;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.quiet, cli.verbose, cli.logfile.as_deref()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Failed(count)) => {
            log::error!("Finished with {count} failure(s)");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::List { systems } => run_list(cli.config, systems),
        Commands::Install {
            systems,
            force,
            workers,
            no_organize,
        } => run_install(cli.config, systems, force, workers, no_organize, cli.quiet),
        Commands::Organize { systems } => run_organize(cli.config, systems),
        Commands::Vacuum { systems } => run_vacuum(cli.config, systems),
        Commands::Config { action } => match action {
            ConfigAction::Show => run_config_show(cli.config),
            ConfigAction::Path => {
                run_config_path(cli.config);
                Ok(())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn systems_are_comma_separated() {
        let cli = Cli::parse_from(["romsift", "install", "-s", "nes,snes", "--force", "-w", "2"]);
        match cli.command {
            Commands::Install {
                systems,
                force,
                workers,
                no_organize,
            } => {
                assert_eq!(systems.systems, vec!["nes", "snes"]);
                assert!(force);
                assert_eq!(workers, Some(2));
                assert!(!no_organize);
            }
            _ => panic!("expected install"),
        }
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from(["romsift", "list", "--config", "/tmp/romsift.toml", "--quiet"]);
        assert!(cli.quiet);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/romsift.toml")));
    }
}
