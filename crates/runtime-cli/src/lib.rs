//! CLI entry point. `main.rs` at the workspace root calls [`run`]
//! after `env_logger::init()`; this crate never initializes logging
//! itself.

pub mod args;
pub mod commands;

use clap::Parser;
use runtime_core::config::Configuration;
use runtime_manager::Manager;

use args::{Cli, Command};
use commands::{execute, info, lifecycle, list, security_report, stats, CommandHandler};

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Configuration::load(&cli.config).await?;
    let manager = Manager::new(config).await?;
    manager.initialize().await?;

    let handler: Box<dyn CommandHandler> = match cli.command {
        Command::Load { id } => Box::new(lifecycle::Load { id }),
        Command::LoadAll => Box::new(lifecycle::LoadAll),
        Command::Activate { id } => Box::new(lifecycle::Activate { id }),
        Command::Disable { id, reason } => Box::new(lifecycle::Disable { id, reason }),
        Command::Unload { id } => Box::new(lifecycle::Unload { id }),
        Command::Reload { id } => Box::new(lifecycle::Reload { id }),
        Command::Execute { id, args } => Box::new(execute::Execute { id, args }),
        Command::List => Box::new(list::List),
        Command::Info { id } => Box::new(info::Info { id }),
        Command::SecurityReport { id } => Box::new(security_report::SecurityReport { id }),
        Command::Stats => Box::new(stats::Stats),
    };

    handler.run(&manager).await
}
