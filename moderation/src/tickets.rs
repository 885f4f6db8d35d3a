//! Requester-side submission flow and moderator-side triage.
//!
//! A [`TicketSession`] tracks where a requester is in the submission dialog.
//! Sessions live in a size-bounded map that forgets idle entries, so an
//! abandoned dialog never leaks. Once a ticket is stored, its own
//! `status` is the only state that matters.

use std::sync::Arc;

use cached::{Cached, TimedSizedCache};
use chrono::Utc;
use futures_util::lock::Mutex;
use modbot_common::{
    bot_commands::{TicketId, TriageAction},
    gateway::{ChatUser, InlineButton, Keyboard, OutgoingMessage},
    teloxide::types::{ChatId, MessageId, UserId},
};

use crate::{
    error::TicketError,
    menu,
    notify::{self, NotificationDispatcher},
    store::{
        ClosureOutcome, ModerationStore, NewTicket, Ticket, TicketClosure, TicketStatus,
        TicketType,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStage {
    /// Menu is open, no type chosen yet
    Idle,
    TypeSelected,
    AwaitingBody,
    AwaitingPhotoCaption,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketSession {
    pub stage: SessionStage,
    pub ticket_type: Option<TicketType>,
    /// Photo staged while waiting for its caption
    pub photo: Option<String>,
}

impl TicketSession {
    fn idle() -> Self {
        Self {
            stage: SessionStage::Idle,
            ticket_type: None,
            photo: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyOutcome {
    /// The requester is not in a submission dialog
    NoSession,
    /// Nothing usable arrived; ask again
    NeedBody,
    /// A photo is staged and needs a text caption
    NeedCaption,
    Submitted(Ticket),
}

/// A moderator pressed "Respond" and their next message is the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingResponse {
    pub ticket_id: TicketId,
    pub triage_message_id: MessageId,
}

pub struct TicketWorkflow {
    store: Arc<dyn ModerationStore>,
    dispatcher: Arc<NotificationDispatcher>,
    support_chat_id: ChatId,
    sessions: Mutex<TimedSizedCache<UserId, TicketSession>>,
    pending_responses: Mutex<TimedSizedCache<(ChatId, UserId), PendingResponse>>,
}

impl TicketWorkflow {
    pub fn new(
        store: Arc<dyn ModerationStore>,
        dispatcher: Arc<NotificationDispatcher>,
        support_chat_id: ChatId,
        session_capacity: usize,
        session_idle_secs: u64,
    ) -> Self {
        // The caches reject a zero capacity
        let session_capacity = session_capacity.max(1);
        Self {
            store,
            dispatcher,
            support_chat_id,
            sessions: Mutex::new(TimedSizedCache::with_size_and_lifespan_and_refresh(
                session_capacity,
                session_idle_secs,
                true,
            )),
            pending_responses: Mutex::new(TimedSizedCache::with_size_and_lifespan_and_refresh(
                session_capacity,
                session_idle_secs,
                true,
            )),
        }
    }

    pub fn support_chat_id(&self) -> ChatId {
        self.support_chat_id
    }

    pub async fn session(&self, requester: UserId) -> Option<TicketSession> {
        self.sessions.lock().await.cache_get(&requester).cloned()
    }

    pub async fn open_menu(&self, requester: UserId) {
        self.sessions
            .lock()
            .await
            .cache_set(requester, TicketSession::idle());
    }

    pub async fn select_type(&self, requester: UserId, ticket_type: TicketType) {
        self.sessions.lock().await.cache_set(
            requester,
            TicketSession {
                stage: SessionStage::TypeSelected,
                ticket_type: Some(ticket_type),
                photo: None,
            },
        );
    }

    /// Returns whether there was a session to discard.
    pub async fn cancel(&self, requester: UserId) -> bool {
        self.sessions.lock().await.cache_remove(&requester).is_some()
    }

    /// Takes the requester's session out of the map, so that concurrent
    /// messages in the same dialog can't both submit it.
    async fn claim_session(&self, requester: UserId) -> Option<TicketSession> {
        self.sessions.lock().await.cache_remove(&requester)
    }

    async fn restore_session(&self, requester: UserId, session: TicketSession) {
        self.sessions.lock().await.cache_set(requester, session);
    }

    pub async fn receive_body(
        &self,
        requester: &ChatUser,
        text: Option<&str>,
        photo: Option<String>,
    ) -> Result<BodyOutcome, TicketError> {
        let Some(session) = self.claim_session(requester.id).await else {
            return Ok(BodyOutcome::NoSession);
        };
        let ticket_type = session.ticket_type.unwrap_or(TicketType::Inquiry);
        if session.stage == SessionStage::AwaitingPhotoCaption {
            return match text {
                Some(text) => {
                    let photo = photo.or(session.photo);
                    self.complete_caption(requester, ticket_type, text, photo)
                        .await
                }
                None => {
                    // A newer photo replaces the staged one
                    self.restore_session(
                        requester.id,
                        TicketSession {
                            photo: photo.or(session.photo),
                            ..session
                        },
                    )
                    .await;
                    Ok(BodyOutcome::NeedCaption)
                }
            };
        }

        let text = text.map(str::trim).filter(|text| !text.is_empty());
        match (text, photo) {
            (Some(text), photo) => {
                let photo = photo.or(session.photo);
                let ticket = self
                    .store_and_post(requester, ticket_type, text.to_string(), photo)
                    .await?;
                Ok(BodyOutcome::Submitted(ticket))
            }
            (None, Some(photo)) => {
                self.restore_session(
                    requester.id,
                    TicketSession {
                        stage: SessionStage::AwaitingPhotoCaption,
                        ticket_type: Some(ticket_type),
                        photo: Some(photo),
                    },
                )
                .await;
                Ok(BodyOutcome::NeedCaption)
            }
            (None, None) => {
                self.restore_session(
                    requester.id,
                    TicketSession {
                        stage: SessionStage::AwaitingBody,
                        ..session
                    },
                )
                .await;
                Ok(BodyOutcome::NeedBody)
            }
        }
    }

    /// Completes a ticket whose photo arrived without text. A blank caption
    /// discards the session.
    pub async fn receive_caption(
        &self,
        requester: &ChatUser,
        text: &str,
    ) -> Result<BodyOutcome, TicketError> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.cache_get(&requester.id) {
                Some(session) if session.stage == SessionStage::AwaitingPhotoCaption => {}
                _ => return Ok(BodyOutcome::NoSession),
            }
            sessions.cache_remove(&requester.id)
        };
        let Some(session) = session else {
            return Ok(BodyOutcome::NoSession);
        };
        self.complete_caption(
            requester,
            session.ticket_type.unwrap_or(TicketType::Inquiry),
            text,
            session.photo,
        )
        .await
    }

    /// The session is already claimed here and is not restored on failure.
    async fn complete_caption(
        &self,
        requester: &ChatUser,
        ticket_type: TicketType,
        text: &str,
        photo: Option<String>,
    ) -> Result<BodyOutcome, TicketError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TicketError::EmptyBody);
        }
        let ticket = self
            .store_and_post(requester, ticket_type, text.to_string(), photo)
            .await?;
        Ok(BodyOutcome::Submitted(ticket))
    }

    /// Stores the ticket, posts it for triage and acknowledges the requester.
    /// Any open session of the requester ends here, whatever happens to the
    /// messages.
    pub async fn submit(
        &self,
        requester: &ChatUser,
        ticket_type: TicketType,
        body: String,
        photo: Option<String>,
    ) -> Result<Ticket, TicketError> {
        self.claim_session(requester.id).await;
        self.store_and_post(requester, ticket_type, body, photo).await
    }

    async fn store_and_post(
        &self,
        requester: &ChatUser,
        ticket_type: TicketType,
        body: String,
        photo: Option<String>,
    ) -> Result<Ticket, TicketError> {
        if body.trim().is_empty() {
            return Err(TicketError::EmptyBody);
        }
        let ticket = self
            .store
            .create_ticket(NewTicket {
                requester: requester.clone(),
                ticket_type,
                body,
                photo,
                created_at: Utc::now(),
            })
            .await?;
        log::info!(
            "Ticket #{} ({}) submitted by {}",
            ticket.id,
            ticket.ticket_type,
            requester.id
        );

        if !self.post_for_triage(&ticket).await {
            log::warn!("Ticket #{} is stored but not posted for triage", ticket.id);
        }
        self.dispatcher
            .send(
                ChatId::from(requester.id),
                OutgoingMessage::text(notify::render_submission_ack(&ticket))
                    .with_keyboard(menu::main_menu()),
            )
            .await;
        Ok(ticket)
    }

    /// Photo captions are capped at [`notify::CAPTION_LIMIT`], so a long photo
    /// ticket goes out as a short caption with the full text replying to it.
    async fn post_for_triage(&self, ticket: &Ticket) -> bool {
        let text = notify::render_triage(ticket);
        let Some(photo) = ticket.photo.clone() else {
            let message = OutgoingMessage::text(text).with_keyboard(triage_keyboard(ticket.id));
            return self.dispatcher.send(self.support_chat_id, message).await.is_some();
        };
        if notify::fits_caption(&text) {
            let message = OutgoingMessage::text(text)
                .with_photo(Some(photo))
                .with_keyboard(triage_keyboard(ticket.id));
            return self.dispatcher.send(self.support_chat_id, message).await.is_some();
        }
        let caption = OutgoingMessage::text(notify::render_triage_caption(ticket))
            .with_photo(Some(photo))
            .with_keyboard(triage_keyboard(ticket.id));
        let Some(photo_message_id) = self.dispatcher.send(self.support_chat_id, caption).await
        else {
            return false;
        };
        self.dispatcher
            .send(
                self.support_chat_id,
                OutgoingMessage::text(text).replying_to(photo_message_id),
            )
            .await
            .is_some()
    }

    pub async fn resolve(&self, id: TicketId, actor: &ChatUser) -> Result<Ticket, TicketError> {
        let ticket = self
            .close(
                id,
                TicketClosure {
                    status: TicketStatus::Resolved,
                    actor: actor.id,
                    response: None,
                    at: Utc::now(),
                },
            )
            .await?;
        log::info!("Ticket #{id} resolved by {}", actor.id);
        self.dispatcher
            .send(
                ChatId::from(ticket.requester_id),
                OutgoingMessage::text(notify::render_resolution_notice(&ticket)),
            )
            .await;
        Ok(ticket)
    }

    /// Closes the ticket with `response` and relays it to the requester
    /// verbatim.
    pub async fn respond(
        &self,
        id: TicketId,
        actor: &ChatUser,
        response: &str,
    ) -> Result<Ticket, TicketError> {
        if response.trim().is_empty() {
            return Err(TicketError::EmptyBody);
        }
        let ticket = self
            .close(
                id,
                TicketClosure {
                    status: TicketStatus::Responded,
                    actor: actor.id,
                    response: Some(response.to_string()),
                    at: Utc::now(),
                },
            )
            .await?;
        log::info!("Ticket #{id} answered by {}", actor.id);
        self.dispatcher
            .send(
                ChatId::from(ticket.requester_id),
                OutgoingMessage::text(notify::render_response_relay(&ticket, response)),
            )
            .await;
        Ok(ticket)
    }

    async fn close(&self, id: TicketId, closure: TicketClosure) -> Result<Ticket, TicketError> {
        match self.store.close_ticket(id, closure).await? {
            ClosureOutcome::Closed(ticket) => Ok(ticket),
            ClosureOutcome::AlreadyTerminal(_) => Err(TicketError::AlreadyTerminal(id)),
            ClosureOutcome::NotFound => Err(TicketError::NotFound(id)),
        }
    }

    /// Binds the moderator's next message in `chat_id` to ticket `id`.
    pub async fn begin_response(
        &self,
        chat_id: ChatId,
        moderator: UserId,
        id: TicketId,
        triage_message_id: MessageId,
    ) -> Result<Ticket, TicketError> {
        let ticket = self
            .store
            .get_ticket(id)
            .await?
            .ok_or(TicketError::NotFound(id))?;
        if ticket.status.is_terminal() {
            return Err(TicketError::AlreadyTerminal(id));
        }
        self.pending_responses.lock().await.cache_set(
            (chat_id, moderator),
            PendingResponse {
                ticket_id: id,
                triage_message_id,
            },
        );
        Ok(ticket)
    }

    pub async fn take_pending_response(
        &self,
        chat_id: ChatId,
        moderator: UserId,
    ) -> Option<PendingResponse> {
        self.pending_responses
            .lock()
            .await
            .cache_remove(&(chat_id, moderator))
    }
}

pub fn triage_keyboard(id: TicketId) -> Keyboard {
    Keyboard::Inline(vec![vec![
        InlineButton {
            label: "✅ Reviewed".to_string(),
            action: TriageAction::Resolve(id),
        },
        InlineButton {
            label: "💬 Respond".to_string(),
            action: TriageAction::Respond(id),
        },
    ]])
}
