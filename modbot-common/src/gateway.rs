//! The boundary between the bot logic and the chat transport.
//!
//! Everything a module needs from Telegram goes through [`ChatGateway`], and
//! everything Telegram sends us arrives already classified as an
//! [`IncomingMessage`] or an [`IncomingCallback`]. This keeps the moderation
//! core free of raw transport types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, MessageId, UserId};

use crate::bot_commands::TriageAction;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_bot: bool,
}

impl ChatUser {
    pub fn full_name(&self) -> String {
        match &self.last_name {
            Some(last_name) => format!("{} {last_name}", self.first_name),
            None => self.first_name.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRank {
    Owner,
    Administrator,
    Member,
}

impl MemberRank {
    pub fn is_privileged(&self) -> bool {
        matches!(self, MemberRank::Owner | MemberRank::Administrator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMemberInfo {
    pub user: ChatUser,
    pub rank: MemberRank,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: TriageAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Keyboard {
    #[default]
    None,
    Inline(Vec<Vec<InlineButton>>),
    /// Persistent reply keyboard with plain-text buttons
    Menu(Vec<Vec<String>>),
    RemoveMenu,
}

/// A message to send. `text` is MarkdownV2.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub photo: Option<String>,
    pub keyboard: Keyboard,
    pub reply_to: Option<MessageId>,
    pub silent: bool,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_photo(mut self, photo: Option<String>) -> Self {
        self.photo = photo;
        self
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }

    pub fn replying_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub from: ChatUser,
    pub text: Option<String>,
    /// File id of the largest photo size, if the message has a photo
    pub photo: Option<String>,
    pub reply_to: Option<ChatUser>,
}

impl IncomingMessage {
    pub fn is_private(&self) -> bool {
        self.chat_id.is_user()
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingCallback {
    pub query_id: String,
    pub from: ChatUser,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub data: String,
}

#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn get_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<ChatMemberInfo, anyhow::Error>;

    /// `username` is given without the leading `@`
    async fn find_member_by_username(
        &self,
        chat_id: ChatId,
        username: &str,
    ) -> Result<ChatMemberInfo, anyhow::Error>;

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), anyhow::Error>;

    /// Revokes send permissions until `until`
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), anyhow::Error>;

    /// Restores full send permissions
    async fn lift_restrictions(&self, chat_id: ChatId, user_id: UserId)
        -> Result<(), anyhow::Error>;

    async fn send_message(
        &self,
        chat_id: ChatId,
        message: OutgoingMessage,
    ) -> Result<MessageId, anyhow::Error>;

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), anyhow::Error>;

    async fn remove_inline_buttons(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), anyhow::Error>;

    async fn answer_callback(&self, query_id: &str, text: &str) -> Result<(), anyhow::Error>;
}
