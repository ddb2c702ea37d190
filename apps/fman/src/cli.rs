//! Command line interface definition

use clap::{Parser, Subcommand};
use fman_types::ColorChoice;
use std::path::PathBuf;

/// fman - feature and plugin manager with configuration history
#[derive(Parser)]
#[command(name = "fman")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Feature and plugin manager with configuration history")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Write a JSON debug log under the state directory
    #[arg(long, global = true)]
    pub debug: bool,

    /// Color output control
    #[arg(long, global = true, value_enum)]
    pub color: Option<ColorChoice>,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory holding the configuration history
    #[arg(long, global = true, value_name = "DIR", env = "FMAN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Install a feature from a source site and configure it
    #[command(alias = "i")]
    Install {
        /// Feature on the source site (`id_version` or id)
        feature: String,

        /// Source site (directory or URL)
        #[arg(long, short)]
        from: String,

        /// Target configured site (defaults to the only one)
        #[arg(long)]
        site: Option<String>,

        /// Optional children to include; all of them when omitted
        #[arg(long, value_delimiter = ',')]
        optional: Option<Vec<String>>,
    },

    /// Unconfigure and remove a feature
    #[command(alias = "rm")]
    Remove {
        feature: String,

        #[arg(long)]
        site: Option<String>,
    },

    /// Configure an installed feature
    Configure {
        feature: String,

        #[arg(long)]
        site: Option<String>,
    },

    /// Unconfigure a feature (refused while a configured feature includes it)
    Unconfigure {
        feature: String,

        #[arg(long)]
        site: Option<String>,
    },

    /// List features on the configured sites
    #[command(alias = "ls")]
    List {
        /// Only this site
        #[arg(long)]
        site: Option<String>,
    },

    /// Show the health of a feature
    Status {
        feature: String,

        #[arg(long)]
        site: Option<String>,
    },

    /// Show configuration history and preserved configurations
    History,

    /// Restore the configured features of an earlier configuration
    Revert {
        /// Configuration id from `fman history`
        id: String,
    },

    /// Keep a configuration outside the history limit
    Preserve {
        /// Configuration id from `fman history`
        id: Option<String>,

        /// Drop a preserved configuration instead
        #[arg(long, value_name = "ID", conflicts_with = "id")]
        remove: Option<String>,
    },

    /// Manage configured sites
    Site {
        #[command(subcommand)]
        command: SiteCommands,
    },
}

/// Configured-site subcommands
#[derive(Subcommand)]
pub enum SiteCommands {
    /// Add a local directory as a configured site
    Add { path: String },

    /// Drop a configured site; its features become unconfigured
    Remove { site: String },

    /// Enable a configured site
    Enable { site: String },

    /// Disable a configured site
    Disable { site: String },

    /// List configured sites
    List,
}

impl Commands {
    /// Whether the command changes the configuration and should be guarded by
    /// Ctrl-C cancellation
    pub fn is_transaction(&self) -> bool {
        matches!(self, Commands::Install { .. } | Commands::Remove { .. })
    }
}
