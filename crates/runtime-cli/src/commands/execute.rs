use async_trait::async_trait;
use runtime_manager::Manager;

use super::CommandHandler;

pub struct Execute {
    pub id: String,
    pub args: String,
}

#[async_trait]
impl CommandHandler for Execute {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        let args: serde_json::Value = serde_json::from_str(&self.args)?;
        match manager.execute(&self.id, args).await {
            Ok(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            Err(e) => println!("error ({}): {}", e.kind_tag(), e),
        }
        Ok(())
    }
}
