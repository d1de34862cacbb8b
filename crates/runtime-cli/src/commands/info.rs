use async_trait::async_trait;
use runtime_manager::Manager;

use super::CommandHandler;

pub struct Info {
    pub id: String,
}

#[async_trait]
impl CommandHandler for Info {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        let info = manager.get_info(&self.id).await?;
        println!("{}", serde_json::to_string_pretty(&info)?);
        Ok(())
    }
}
