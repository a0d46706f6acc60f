//! CLI type definitions: command enums and argument structs.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "romsift")]
#[command(about = "Filter, prioritize and install romsets", long_about = None)]
pub(crate) struct Cli {
    /// Config file (defaults to $ROMSIFT_CONFIG, then the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Only show warnings and errors (suppress normal output)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Enable verbose/debug logging (timestamps + debug-level messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write log output to a file (ANSI codes stripped)
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Arguments shared by commands that run the selection pipeline.
#[derive(Args, Clone, Default)]
pub(crate) struct SystemArgs {
    /// Systems to process (e.g., nes,snes,arcade); all configured systems by default
    #[arg(short, long, value_delimiter = ',')]
    pub systems: Vec<String>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Print the selected machines, one JSON object per line
    List {
        #[command(flatten)]
        systems: SystemArgs,
    },

    /// Download and install the selected machines, then organize directories
    Install {
        #[command(flatten)]
        systems: SystemArgs,

        /// Re-download and reinstall files that already exist
        #[arg(short, long)]
        force: bool,

        /// Concurrent installs (overrides settings.workers)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Skip directory synchronization after installing
        #[arg(long)]
        no_organize: bool,
    },

    /// Synchronize configured directories with installed machines
    Organize {
        #[command(flatten)]
        systems: SystemArgs,
    },

    /// Print removal commands for installed files nothing selects anymore
    Vacuum {
        #[command(flatten)]
        systems: SystemArgs,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show the resolved configuration
    Show,

    /// Print the config file path
    Path,
}
