use async_trait::async_trait;
use runtime_manager::Manager;

use super::CommandHandler;

pub struct Stats;

#[async_trait]
impl CommandHandler for Stats {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        let stats = manager.stats().await;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        Ok(())
    }
}
