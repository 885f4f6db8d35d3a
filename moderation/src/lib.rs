pub mod engine;
pub mod error;
mod features;
pub mod menu;
pub mod notify;
pub mod resolver;
pub mod store;
pub mod tickets;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use modbot_common::{
    bot_commands::Command,
    gateway::{ChatGateway, IncomingCallback, IncomingMessage},
    hub::BotModule,
    teloxide::types::{ChatId, UserId},
};

use engine::{EscalationPolicy, ModerationEngine};
use notify::NotificationDispatcher;
use store::ModerationStore;
use tickets::TicketWorkflow;

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// May set and clear the broadcast message
    pub owner_id: UserId,
    /// Where tickets are posted for triage
    pub support_chat_id: ChatId,
    /// If set, moderation commands only work in this chat
    pub allowed_chat_id: Option<ChatId>,
    pub escalation: EscalationPolicy,
    pub session_idle: Duration,
    pub session_capacity: usize,
}

pub struct ModerationModule {
    config: ModerationConfig,
    gateway: Arc<dyn ChatGateway>,
    store: Arc<dyn ModerationStore>,
    engine: ModerationEngine,
    tickets: TicketWorkflow,
    dispatcher: Arc<NotificationDispatcher>,
}

impl ModerationModule {
    pub fn new(
        config: ModerationConfig,
        gateway: Arc<dyn ChatGateway>,
        store: Arc<dyn ModerationStore>,
    ) -> Self {
        let dispatcher = Arc::new(NotificationDispatcher::new(
            Arc::clone(&gateway),
            Arc::clone(&store),
        ));
        let engine =
            ModerationEngine::new(Arc::clone(&gateway), Arc::clone(&store), config.escalation);
        let tickets = TicketWorkflow::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            config.support_chat_id,
            config.session_capacity,
            config.session_idle.as_secs(),
        );
        Self {
            config,
            gateway,
            store,
            engine,
            tickets,
            dispatcher,
        }
    }

    pub fn engine(&self) -> &ModerationEngine {
        &self.engine
    }

    pub fn tickets(&self) -> &TicketWorkflow {
        &self.tickets
    }
}

#[async_trait]
impl BotModule for ModerationModule {
    fn name(&self) -> &'static str {
        "Moderation"
    }

    async fn start(&self) -> Result<(), anyhow::Error> {
        log::info!(
            "Moderation started: support chat {}, allowed chat {:?}, warn limit action {:?}",
            self.config.support_chat_id,
            self.config.allowed_chat_id,
            self.config.escalation
        );
        Ok(())
    }

    async fn handle_message(&self, message: &IncomingMessage) -> Result<(), anyhow::Error> {
        if let Some(command) = message.text.as_deref().and_then(Command::parse) {
            return match command {
                Command::Start => self.handle_start(message).await,
                Command::Help => self.handle_help(message).await,
                Command::Id => self.handle_id(message).await,
                Command::Cancel => self.handle_cancel(message).await,
                Command::SetBroadcast(text) => self.handle_set_broadcast(message, &text).await,
                Command::ClearBroadcast => self.handle_clear_broadcast(message).await,
                command => self.handle_moderation_command(message, command).await,
            };
        }
        if self.handle_pending_response(message).await? {
            return Ok(());
        }
        if message.is_private() {
            self.handle_private_message(message).await?;
        }
        Ok(())
    }

    async fn handle_callback(&self, callback: &IncomingCallback) -> Result<(), anyhow::Error> {
        self.handle_triage_callback(callback).await
    }
}
