use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use modbot_common::{
    bot_commands::TicketId,
    teloxide::types::{ChatId, UserId},
};
use tokio::sync::RwLock;

use super::{
    BroadcastMessage, ClosureOutcome, ModerationStore, NewTicket, Ticket, TicketClosure,
    TicketStatus, Warning,
};

/// Process-local store. Loses everything on restart; used in tests and when
/// no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    // Kept in insertion order
    warnings: HashMap<(ChatId, UserId), Vec<Warning>>,
    tickets: BTreeMap<TicketId, Ticket>,
    last_ticket_id: i64,
    broadcast: Option<BroadcastMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn insert_warning(&self, warning: Warning) -> Result<(), anyhow::Error> {
        self.inner
            .write()
            .await
            .warnings
            .entry((warning.chat_id, warning.user_id))
            .or_default()
            .push(warning);
        Ok(())
    }

    async fn get_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Vec<Warning>, anyhow::Error> {
        let mut warnings = self
            .inner
            .read()
            .await
            .warnings
            .get(&(chat_id, user_id))
            .cloned()
            .unwrap_or_default();
        // Stable, so ties stay in insertion order
        warnings.sort_by_key(|warning| warning.created_at);
        Ok(warnings)
    }

    async fn count_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<usize, anyhow::Error> {
        Ok(self
            .inner
            .read()
            .await
            .warnings
            .get(&(chat_id, user_id))
            .map_or(0, Vec::len))
    }

    async fn delete_latest_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<Warning>, anyhow::Error> {
        let mut inner = self.inner.write().await;
        let Some(warnings) = inner.warnings.get_mut(&(chat_id, user_id)) else {
            return Ok(None);
        };
        // max_by_key returns the last of equal maxima, i.e. the latest inserted
        let latest = warnings
            .iter()
            .enumerate()
            .max_by_key(|(_, warning)| warning.created_at)
            .map(|(index, _)| index);
        Ok(latest.map(|index| warnings.remove(index)))
    }

    async fn clear_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<usize, anyhow::Error> {
        Ok(self
            .inner
            .write()
            .await
            .warnings
            .remove(&(chat_id, user_id))
            .map_or(0, |warnings| warnings.len()))
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, anyhow::Error> {
        let mut inner = self.inner.write().await;
        inner.last_ticket_id += 1;
        let ticket = Ticket {
            id: TicketId(inner.last_ticket_id),
            requester_id: ticket.requester.id,
            username: ticket.requester.username.clone(),
            display_name: ticket.requester.full_name(),
            ticket_type: ticket.ticket_type,
            body: ticket.body,
            photo: ticket.photo,
            status: TicketStatus::Pending,
            handled_by: None,
            response: None,
            created_at: ticket.created_at,
            resolved_at: None,
        };
        inner.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>, anyhow::Error> {
        Ok(self.inner.read().await.tickets.get(&id).cloned())
    }

    async fn close_ticket(
        &self,
        id: TicketId,
        closure: TicketClosure,
    ) -> Result<ClosureOutcome, anyhow::Error> {
        let mut inner = self.inner.write().await;
        let Some(ticket) = inner.tickets.get_mut(&id) else {
            return Ok(ClosureOutcome::NotFound);
        };
        if ticket.status.is_terminal() {
            return Ok(ClosureOutcome::AlreadyTerminal(ticket.clone()));
        }
        ticket.status = closure.status;
        ticket.handled_by = Some(closure.actor);
        ticket.response = closure.response;
        ticket.resolved_at = Some(closure.at);
        Ok(ClosureOutcome::Closed(ticket.clone()))
    }

    async fn get_broadcast_message(&self) -> Result<Option<BroadcastMessage>, anyhow::Error> {
        Ok(self.inner.read().await.broadcast.clone())
    }

    async fn set_broadcast_message(
        &self,
        message: BroadcastMessage,
    ) -> Result<(), anyhow::Error> {
        self.inner.write().await.broadcast = Some(message);
        Ok(())
    }

    async fn clear_broadcast_message(&self) -> Result<bool, anyhow::Error> {
        Ok(self.inner.write().await.broadcast.take().is_some())
    }
}
