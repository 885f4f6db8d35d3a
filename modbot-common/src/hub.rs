use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard};

use crate::gateway::{IncomingCallback, IncomingMessage};

/// Registry of modules that receive every classified update.
#[derive(Default)]
pub struct HubState {
    bot_modules: RwLock<Vec<Arc<dyn BotModule>>>,
}

impl HubState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_bot_module<M: BotModule>(&self, module: impl Into<Arc<M>>) {
        self.bot_modules.write().await.push(module.into());
    }

    pub async fn bot_modules(&self) -> RwLockReadGuard<Vec<Arc<dyn BotModule>>> {
        self.bot_modules.read().await
    }

    pub async fn start_modules(&self) -> Result<(), anyhow::Error> {
        for module in self.bot_modules().await.iter() {
            log::info!("Starting module {}", module.name());
            module.start().await?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait BotModule: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn start(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn handle_message(&self, message: &IncomingMessage) -> Result<(), anyhow::Error>;

    /// Implementations must answer the callback query, even when the data is
    /// not theirs to handle.
    async fn handle_callback(&self, callback: &IncomingCallback) -> Result<(), anyhow::Error>;
}
