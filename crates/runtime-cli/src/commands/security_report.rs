use async_trait::async_trait;
use runtime_manager::Manager;

use super::CommandHandler;

pub struct SecurityReport {
    pub id: String,
}

#[async_trait]
impl CommandHandler for SecurityReport {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        let report = manager.security_report(&self.id).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
