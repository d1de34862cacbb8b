//! Command dispatch, grounded on the teacher's `fluent-cli::commands`
//! `CommandHandler` trait pattern: one async handler per subcommand,
//! all returning `anyhow::Result<()>` and printing their own output.

use async_trait::async_trait;
use runtime_manager::Manager;

#[async_trait]
pub trait CommandHandler {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()>;
}

pub mod execute;
pub mod info;
pub mod lifecycle;
pub mod list;
pub mod security_report;
pub mod stats;
