#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicI32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use modbot_common::{
    bot_commands::TicketId,
    gateway::{
        ChatGateway, ChatMemberInfo, ChatUser, IncomingCallback, IncomingMessage, MemberRank,
        OutgoingMessage,
    },
    teloxide::types::{ChatId, MessageId, UserId},
};
use moderation::{
    engine::EscalationPolicy,
    store::{
        BroadcastMessage, ClosureOutcome, MemoryStore, ModerationStore, NewTicket, Ticket,
        TicketClosure, Warning,
    },
    ModerationConfig, ModerationModule,
};

pub const GROUP: ChatId = ChatId(-100_123);
pub const SUPPORT_CHAT: ChatId = ChatId(-100_999);
pub const OWNER: UserId = UserId(1);

/// Records everything the bot does and answers member lookups from a fixed
/// roster.
#[derive(Default)]
pub struct FakeGateway {
    members: Mutex<HashMap<(ChatId, UserId), ChatMemberInfo>>,
    pub sent: Mutex<Vec<(ChatId, OutgoingMessage)>>,
    pub bans: Mutex<Vec<(ChatId, UserId)>>,
    pub restrictions: Mutex<Vec<(ChatId, UserId, DateTime<Utc>)>>,
    pub lifted: Mutex<Vec<(ChatId, UserId)>>,
    pub deleted: Mutex<Vec<(ChatId, MessageId)>>,
    pub buttons_removed: Mutex<Vec<(ChatId, MessageId)>>,
    pub answered: Mutex<Vec<(String, String)>>,
    /// Makes every `send_message` fail
    pub fail_sends: AtomicBool,
    /// Makes every `ban_member` fail
    pub fail_bans: AtomicBool,
    last_message_id: AtomicI32,
}

impl FakeGateway {
    pub fn add_member(&self, chat_id: ChatId, user: &ChatUser, rank: MemberRank) {
        self.members.lock().unwrap().insert(
            (chat_id, user.id),
            ChatMemberInfo {
                user: user.clone(),
                rank,
            },
        );
    }

    pub fn texts_to(&self, chat_id: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, message)| message.text.clone())
            .collect()
    }

    pub fn messages_to(&self, chat_id: ChatId) -> Vec<OutgoingMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(chat, _)| *chat == chat_id)
            .map(|(_, message)| message.clone())
            .collect()
    }
}

#[async_trait]
impl ChatGateway for FakeGateway {
    async fn get_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<ChatMemberInfo, anyhow::Error> {
        self.members
            .lock()
            .unwrap()
            .get(&(chat_id, user_id))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("user not found"))
    }

    async fn find_member_by_username(
        &self,
        chat_id: ChatId,
        username: &str,
    ) -> Result<ChatMemberInfo, anyhow::Error> {
        self.members
            .lock()
            .unwrap()
            .iter()
            .find(|((chat, _), member)| {
                *chat == chat_id && member.user.username.as_deref() == Some(username)
            })
            .map(|(_, member)| member.clone())
            .ok_or_else(|| anyhow::anyhow!("user not found"))
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), anyhow::Error> {
        if self.fail_bans.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Bad Request: not enough rights to ban"));
        }
        self.bans.lock().unwrap().push((chat_id, user_id));
        Ok(())
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        self.restrictions
            .lock()
            .unwrap()
            .push((chat_id, user_id, until));
        Ok(())
    }

    async fn lift_restrictions(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        self.lifted.lock().unwrap().push((chat_id, user_id));
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        message: OutgoingMessage,
    ) -> Result<MessageId, anyhow::Error> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("Forbidden: bot was kicked from the chat"));
        }
        self.sent.lock().unwrap().push((chat_id, message));
        Ok(MessageId(
            self.last_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        ))
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), anyhow::Error> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }

    async fn remove_inline_buttons(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), anyhow::Error> {
        self.buttons_removed
            .lock()
            .unwrap()
            .push((chat_id, message_id));
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: &str) -> Result<(), anyhow::Error> {
        self.answered
            .lock()
            .unwrap()
            .push((query_id.to_string(), text.to_string()));
        Ok(())
    }
}

/// [`MemoryStore`] that gives other tasks a chance to run while a ticket is
/// being created, the way a database round-trip would.
#[derive(Default)]
pub struct YieldingStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl ModerationStore for YieldingStore {
    async fn insert_warning(&self, warning: Warning) -> Result<(), anyhow::Error> {
        self.inner.insert_warning(warning).await
    }

    async fn get_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Vec<Warning>, anyhow::Error> {
        self.inner.get_warnings(chat_id, user_id).await
    }

    async fn count_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<usize, anyhow::Error> {
        self.inner.count_warnings(chat_id, user_id).await
    }

    async fn delete_latest_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<Warning>, anyhow::Error> {
        self.inner.delete_latest_warning(chat_id, user_id).await
    }

    async fn clear_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<usize, anyhow::Error> {
        self.inner.clear_warnings(chat_id, user_id).await
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, anyhow::Error> {
        tokio::task::yield_now().await;
        let ticket = self.inner.create_ticket(ticket).await?;
        tokio::task::yield_now().await;
        Ok(ticket)
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>, anyhow::Error> {
        self.inner.get_ticket(id).await
    }

    async fn close_ticket(
        &self,
        id: TicketId,
        closure: TicketClosure,
    ) -> Result<ClosureOutcome, anyhow::Error> {
        self.inner.close_ticket(id, closure).await
    }

    async fn get_broadcast_message(&self) -> Result<Option<BroadcastMessage>, anyhow::Error> {
        self.inner.get_broadcast_message().await
    }

    async fn set_broadcast_message(
        &self,
        message: BroadcastMessage,
    ) -> Result<(), anyhow::Error> {
        self.inner.set_broadcast_message(message).await
    }

    async fn clear_broadcast_message(&self) -> Result<bool, anyhow::Error> {
        self.inner.clear_broadcast_message().await
    }
}

pub fn user(id: u64, username: &str) -> ChatUser {
    ChatUser {
        id: UserId(id),
        username: Some(username.to_string()),
        first_name: username.to_string(),
        last_name: None,
        is_bot: false,
    }
}

pub fn config(escalation: EscalationPolicy) -> ModerationConfig {
    ModerationConfig {
        owner_id: OWNER,
        support_chat_id: SUPPORT_CHAT,
        allowed_chat_id: None,
        escalation,
        session_idle: Duration::from_secs(1800),
        session_capacity: 100,
    }
}

pub struct Harness {
    pub gateway: Arc<FakeGateway>,
    pub store: Arc<MemoryStore>,
    pub module: ModerationModule,
    pub admin: ChatUser,
    pub bob: ChatUser,
    last_message_id: AtomicI32,
}

impl Harness {
    /// `@admin` (id 10) administers [`GROUP`], `@bob` (id 20) is a member.
    pub fn new(config: ModerationConfig) -> Self {
        let gateway = Arc::new(FakeGateway::default());
        let store = Arc::new(MemoryStore::new());
        let admin = user(10, "admin");
        let bob = user(20, "bob");
        gateway.add_member(GROUP, &admin, MemberRank::Administrator);
        gateway.add_member(GROUP, &bob, MemberRank::Member);
        let module = ModerationModule::new(config, gateway.clone(), store.clone());
        Self {
            gateway,
            store,
            module,
            admin,
            bob,
            last_message_id: AtomicI32::new(1000),
        }
    }

    pub fn message(&self, chat_id: ChatId, from: &ChatUser, text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id,
            message_id: MessageId(self.last_message_id.fetch_add(1, Ordering::SeqCst)),
            from: from.clone(),
            text: Some(text.to_string()),
            photo: None,
            reply_to: None,
        }
    }

    pub fn private_message(
        &self,
        from: &ChatUser,
        text: Option<&str>,
        photo: Option<&str>,
    ) -> IncomingMessage {
        IncomingMessage {
            chat_id: ChatId::from(from.id),
            message_id: MessageId(self.last_message_id.fetch_add(1, Ordering::SeqCst)),
            from: from.clone(),
            text: text.map(str::to_string),
            photo: photo.map(str::to_string),
            reply_to: None,
        }
    }

    pub fn callback(
        &self,
        from: &ChatUser,
        message_id: MessageId,
        data: &str,
    ) -> IncomingCallback {
        IncomingCallback {
            query_id: format!("query-{}", message_id.0),
            from: from.clone(),
            chat_id: SUPPORT_CHAT,
            message_id,
            data: data.to_string(),
        }
    }
}
