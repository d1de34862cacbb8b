use async_trait::async_trait;
use runtime_manager::Manager;

use super::CommandHandler;

pub struct List;

#[async_trait]
impl CommandHandler for List {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        let plugins = manager.list().await;
        if plugins.is_empty() {
            println!("no plugins loaded");
            return Ok(());
        }
        for plugin in plugins {
            println!(
                "{:<20} {:<10?} executions={} failures={}",
                plugin.id, plugin.status, plugin.stats.executions, plugin.stats.failures
            );
        }
        Ok(())
    }
}
