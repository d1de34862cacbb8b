//! CLI argument surface, grounded on the teacher's `fluent-cli::args`
//! clap-derive layout.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "plugin-runtime", version, about = "Secure plugin runtime operator CLI")]
pub struct Cli {
    /// Path to the runtime's TOML configuration file.
    #[arg(long, default_value = "runtime.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a single plugin by id.
    Load { id: String },
    /// Discover and load every plugin under plugins_dir, in dependency order.
    LoadAll,
    /// Activate a loaded or disabled plugin.
    Activate { id: String },
    /// Disable an active plugin.
    Disable {
        id: String,
        #[arg(long, default_value = "operator request")]
        reason: String,
    },
    /// Unload a plugin, tearing down its sandbox.
    Unload { id: String },
    /// Reload a plugin from disk (unload then load).
    Reload { id: String },
    /// Invoke a plugin's `execute` entrypoint with a JSON argument.
    Execute {
        id: String,
        /// JSON value passed to the plugin, e.g. '{"x": 1}'.
        #[arg(long, default_value = "null")]
        args: String,
    },
    /// List every known plugin and its status.
    List,
    /// Show detailed info for one plugin.
    Info { id: String },
    /// Show the security report for one plugin.
    SecurityReport { id: String },
    /// Show aggregate runtime statistics.
    Stats,
}
