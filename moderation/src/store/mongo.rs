use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use futures_util::TryStreamExt;
use modbot_common::{
    bot_commands::TicketId,
    mongodb::{options::ReturnDocument, Collection, Database, IndexModel},
    teloxide::types::{ChatId, UserId},
};
use serde::{Deserialize, Serialize};

use super::{
    BroadcastMessage, ClosureOutcome, ModerationStore, NewTicket, Ticket, TicketClosure,
    TicketStatus, TicketType, Warning,
};

const TICKET_COUNTER: &str = "tickets";
const BROADCAST_KEY: &str = "broadcast";

pub struct MongoStore {
    warnings: Collection<WarningDocument>,
    tickets: Collection<TicketDocument>,
    counters: Collection<Document>,
    broadcast: Collection<BroadcastDocument>,
}

#[derive(Serialize, Deserialize, Debug)]
struct WarningDocument {
    // Generated on insert; breaks ties between equal timestamps
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    chat_id: i64,
    user_id: i64,
    reason: String,
    issued_by: i64,
    created_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Debug)]
struct TicketDocument {
    #[serde(rename = "_id")]
    id: i64,
    requester_id: i64,
    username: Option<String>,
    display_name: String,
    ticket_type: TicketType,
    body: String,
    photo: Option<String>,
    status: TicketStatus,
    handled_by: Option<i64>,
    response: Option<String>,
    created_at: bson::DateTime,
    resolved_at: Option<bson::DateTime>,
}

#[derive(Serialize, Deserialize, Debug)]
struct BroadcastDocument {
    #[serde(rename = "_id")]
    key: String,
    text: String,
    owner_id: i64,
}

impl From<WarningDocument> for Warning {
    fn from(document: WarningDocument) -> Self {
        Self {
            chat_id: ChatId(document.chat_id),
            user_id: UserId(document.user_id as u64),
            reason: document.reason,
            issued_by: UserId(document.issued_by as u64),
            created_at: document.created_at.to_chrono(),
        }
    }
}

impl From<TicketDocument> for Ticket {
    fn from(document: TicketDocument) -> Self {
        Self {
            id: TicketId(document.id),
            requester_id: UserId(document.requester_id as u64),
            username: document.username,
            display_name: document.display_name,
            ticket_type: document.ticket_type,
            body: document.body,
            photo: document.photo,
            status: document.status,
            handled_by: document.handled_by.map(|id| UserId(id as u64)),
            response: document.response,
            created_at: document.created_at.to_chrono(),
            resolved_at: document.resolved_at.map(|at| at.to_chrono()),
        }
    }
}

fn ledger_filter(chat_id: ChatId, user_id: UserId) -> Document {
    doc! { "chat_id": chat_id.0, "user_id": user_id.0 as i64 }
}

impl MongoStore {
    pub async fn new(db: Database) -> Result<Self, anyhow::Error> {
        let warnings = db.collection::<WarningDocument>("warnings");
        warnings
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "chat_id": 1, "user_id": 1, "created_at": 1 })
                    .build(),
            )
            .await?;
        let tickets = db.collection::<TicketDocument>("tickets");
        tickets
            .create_index(IndexModel::builder().keys(doc! { "status": 1 }).build())
            .await?;
        Ok(Self {
            warnings,
            tickets,
            counters: db.collection("counters"),
            broadcast: db.collection("broadcast_message"),
        })
    }

    async fn next_ticket_id(&self) -> Result<TicketId, anyhow::Error> {
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": TICKET_COUNTER },
                doc! { "$inc": { "seq": 1_i64 } },
            )
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Ticket counter upsert returned nothing"))?;
        Ok(TicketId(counter.get_i64("seq")?))
    }
}

#[async_trait]
impl ModerationStore for MongoStore {
    async fn insert_warning(&self, warning: Warning) -> Result<(), anyhow::Error> {
        self.warnings
            .insert_one(WarningDocument {
                id: None,
                chat_id: warning.chat_id.0,
                user_id: warning.user_id.0 as i64,
                reason: warning.reason,
                issued_by: warning.issued_by.0 as i64,
                created_at: bson::DateTime::from_chrono(warning.created_at),
            })
            .await?;
        Ok(())
    }

    async fn get_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Vec<Warning>, anyhow::Error> {
        let documents: Vec<WarningDocument> = self
            .warnings
            .find(ledger_filter(chat_id, user_id))
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await?
            .try_collect()
            .await?;
        Ok(documents.into_iter().map(Warning::from).collect())
    }

    async fn count_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<usize, anyhow::Error> {
        let count = self
            .warnings
            .count_documents(ledger_filter(chat_id, user_id))
            .await?;
        Ok(count as usize)
    }

    async fn delete_latest_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<Warning>, anyhow::Error> {
        let deleted = self
            .warnings
            .find_one_and_delete(ledger_filter(chat_id, user_id))
            .sort(doc! { "created_at": -1, "_id": -1 })
            .await?;
        Ok(deleted.map(Warning::from))
    }

    async fn clear_warnings(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<usize, anyhow::Error> {
        let result = self
            .warnings
            .delete_many(ledger_filter(chat_id, user_id))
            .await?;
        Ok(result.deleted_count as usize)
    }

    async fn create_ticket(&self, ticket: NewTicket) -> Result<Ticket, anyhow::Error> {
        let id = self.next_ticket_id().await?;
        let document = TicketDocument {
            id: id.0,
            requester_id: ticket.requester.id.0 as i64,
            username: ticket.requester.username.clone(),
            display_name: ticket.requester.full_name(),
            ticket_type: ticket.ticket_type,
            body: ticket.body,
            photo: ticket.photo,
            status: TicketStatus::Pending,
            handled_by: None,
            response: None,
            created_at: bson::DateTime::from_chrono(ticket.created_at),
            resolved_at: None,
        };
        self.tickets.insert_one(&document).await?;
        Ok(document.into())
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<Ticket>, anyhow::Error> {
        Ok(self
            .tickets
            .find_one(doc! { "_id": id.0 })
            .await?
            .map(Ticket::from))
    }

    async fn close_ticket(
        &self,
        id: TicketId,
        closure: TicketClosure,
    ) -> Result<ClosureOutcome, anyhow::Error> {
        let closed = self
            .tickets
            .find_one_and_update(
                doc! { "_id": id.0, "status": bson::to_bson(&TicketStatus::Pending)? },
                doc! {
                    "$set": {
                        "status": bson::to_bson(&closure.status)?,
                        "handled_by": closure.actor.0 as i64,
                        "response": closure.response,
                        "resolved_at": bson::DateTime::from_chrono(closure.at),
                    }
                },
            )
            .return_document(ReturnDocument::After)
            .await?;
        if let Some(ticket) = closed {
            return Ok(ClosureOutcome::Closed(ticket.into()));
        }
        Ok(match self.get_ticket(id).await? {
            Some(ticket) => ClosureOutcome::AlreadyTerminal(ticket),
            None => ClosureOutcome::NotFound,
        })
    }

    async fn get_broadcast_message(&self) -> Result<Option<BroadcastMessage>, anyhow::Error> {
        Ok(self
            .broadcast
            .find_one(doc! { "_id": BROADCAST_KEY })
            .await?
            .map(|document| BroadcastMessage {
                text: document.text,
                owner_id: UserId(document.owner_id as u64),
            }))
    }

    async fn set_broadcast_message(
        &self,
        message: BroadcastMessage,
    ) -> Result<(), anyhow::Error> {
        self.broadcast
            .replace_one(
                doc! { "_id": BROADCAST_KEY },
                BroadcastDocument {
                    key: BROADCAST_KEY.to_string(),
                    text: message.text,
                    owner_id: message.owner_id.0 as i64,
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn clear_broadcast_message(&self) -> Result<bool, anyhow::Error> {
        let result = self
            .broadcast
            .delete_one(doc! { "_id": BROADCAST_KEY })
            .await?;
        Ok(result.deleted_count > 0)
    }
}
