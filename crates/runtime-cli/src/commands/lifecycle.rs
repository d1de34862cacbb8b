//! Load/activate/disable/unload/reload command handlers.

use async_trait::async_trait;
use runtime_manager::Manager;

use super::CommandHandler;

pub struct Load {
    pub id: String,
}

#[async_trait]
impl CommandHandler for Load {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        manager.load(&self.id).await?;
        println!("loaded '{}'", self.id);
        Ok(())
    }
}

pub struct LoadAll;

#[async_trait]
impl CommandHandler for LoadAll {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        let results = manager.load_all().await?;
        for (id, outcome) in results {
            match outcome {
                Ok(()) => println!("loaded '{id}'"),
                Err(e) => println!("failed '{id}': {} ({})", e, e.kind_tag()),
            }
        }
        Ok(())
    }
}

pub struct Activate {
    pub id: String,
}

#[async_trait]
impl CommandHandler for Activate {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        manager.activate(&self.id).await?;
        println!("activated '{}'", self.id);
        Ok(())
    }
}

pub struct Disable {
    pub id: String,
    pub reason: String,
}

#[async_trait]
impl CommandHandler for Disable {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        manager.disable(&self.id, &self.reason).await?;
        println!("disabled '{}'", self.id);
        Ok(())
    }
}

pub struct Unload {
    pub id: String,
}

#[async_trait]
impl CommandHandler for Unload {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        manager.unload(&self.id).await?;
        println!("unloaded '{}'", self.id);
        Ok(())
    }
}

pub struct Reload {
    pub id: String,
}

#[async_trait]
impl CommandHandler for Reload {
    async fn run(&self, manager: &Manager) -> anyhow::Result<()> {
        manager.reload(&self.id).await?;
        println!("reloaded '{}'", self.id);
        Ok(())
    }
}
