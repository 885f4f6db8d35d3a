//! Persistence contract for warnings, tickets and the broadcast message.
//!
//! Stores hold no business rules, but some operations must be atomic in the
//! store itself: deleting the latest warning and closing a pending ticket are
//! each a single conditional write, never a read followed by a write.

pub mod memory;
pub mod mongo;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use modbot_common::{
    bot_commands::TicketId,
    gateway::ChatUser,
    teloxide::types::{ChatId, UserId},
};
use serde::{Deserialize, Serialize};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

/// One infraction. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub reason: String,
    pub issued_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketType {
    Appeal,
    Complaint,
    Suggestion,
    /// Used when a body arrives before any type was chosen
    Inquiry,
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TicketType::Appeal => "Appeal",
            TicketType::Complaint => "Complaint",
            TicketType::Suggestion => "Suggestion",
            TicketType::Inquiry => "Inquiry",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketStatus {
    Pending,
    Resolved,
    Responded,
}

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TicketStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub requester_id: UserId,
    pub username: Option<String>,
    pub display_name: String,
    pub ticket_type: TicketType,
    pub body: String,
    pub photo: Option<String>,
    pub status: TicketStatus,
    pub handled_by: Option<UserId>,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub requester: ChatUser,
    pub ticket_type: TicketType,
    pub body: String,
    pub photo: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The one mutation a ticket ever receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketClosure {
    pub status: TicketStatus,
    pub actor: UserId,
    pub response: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosureOutcome {
    Closed(Ticket),
    /// The ticket was already closed; carries it unchanged
    AlreadyTerminal(Ticket),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastMessage {
    pub text: String,
    pub owner_id: UserId,
}

#[async_trait]
pub trait ModerationStore: Send + Sync {
    async fn insert_warning(&self, warning: Warning) -> Result<(), anyhow::Error>;

    /// Oldest first. Warnings with equal timestamps keep insertion order.
    async fn get_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Vec<Warning>, anyhow::Error>;

    async fn count_warnings(&self, chat_id: ChatId, user_id: UserId)
        -> Result<usize, anyhow::Error>;

    /// Atomically deletes the warning with the latest timestamp (the most
    /// recently inserted one on ties) and returns it.
    async fn delete_latest_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<Warning>, anyhow::Error>;

    /// Returns the number of deleted warnings.
    async fn clear_warnings(&self, chat_id: ChatId, user_id: UserId)
        -> Result<usize, anyhow::Error>;

    /// Assigns the next id and stores the ticket as pending.
    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, anyhow::Error>;

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>, anyhow::Error>;

    /// Applies `closure` only if the ticket is still pending.
    async fn close_ticket(
        &self,
        id: TicketId,
        closure: TicketClosure,
    ) -> Result<ClosureOutcome, anyhow::Error>;

    async fn get_broadcast_message(&self) -> Result<Option<BroadcastMessage>, anyhow::Error>;

    /// Replaces any existing broadcast message.
    async fn set_broadcast_message(&self, message: BroadcastMessage)
        -> Result<(), anyhow::Error>;

    /// Returns whether a message was removed.
    async fn clear_broadcast_message(&self) -> Result<bool, anyhow::Error>;
}
