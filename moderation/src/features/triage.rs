use modbot_common::{
    bot_commands::TriageAction,
    gateway::{ChatUser, IncomingCallback, IncomingMessage, OutgoingMessage},
    teloxide::{
        types::{ChatId, MessageId},
        utils::markdown,
    },
    utils::user_mention,
};

use crate::{error::TicketError, notify, store::Ticket, ModerationModule};

impl ModerationModule {
    pub(crate) async fn handle_triage_callback(
        &self,
        callback: &IncomingCallback,
    ) -> Result<(), anyhow::Error> {
        let action = match callback.data.parse::<TriageAction>() {
            Ok(action) => action,
            Err(err) => {
                log::debug!("Rejecting callback data {:?}: {err}", callback.data);
                self.answer_callback(callback, "Unknown action").await;
                return Ok(());
            }
        };
        if callback.chat_id != self.tickets.support_chat_id() {
            self.answer_callback(callback, "Tickets can only be handled in the support chat")
                .await;
            return Ok(());
        }

        let id = action.ticket_id();
        let result = match action {
            TriageAction::Resolve(id) => self.tickets.resolve(id, &callback.from).await,
            TriageAction::Respond(id) => {
                self.tickets
                    .begin_response(callback.chat_id, callback.from.id, id, callback.message_id)
                    .await
            }
        };
        match result {
            Ok(ticket) => {
                if let TriageAction::Resolve(_) = action {
                    self.finish_triage(
                        callback.chat_id,
                        callback.message_id,
                        &ticket,
                        &callback.from,
                    )
                    .await;
                    self.answer_callback(callback, &format!("Ticket #{id} marked as reviewed"))
                        .await;
                } else {
                    self.dispatcher
                        .send(
                            callback.chat_id,
                            OutgoingMessage::text(format!(
                                "✍️ {}, write your response to ticket \\#{id}\\. Send /cancel to abort\\.",
                                user_mention(&callback.from)
                            ))
                            .replying_to(callback.message_id),
                        )
                        .await;
                    self.answer_callback(callback, "Write your response in the chat")
                        .await;
                }
                Ok(())
            }
            Err(TicketError::AlreadyTerminal(_)) => {
                self.remove_triage_buttons(callback.chat_id, callback.message_id)
                    .await;
                self.answer_callback(callback, &format!("Ticket #{id} has already been handled"))
                    .await;
                Ok(())
            }
            Err(err @ (TicketError::NotFound(_) | TicketError::EmptyBody)) => {
                self.answer_callback(callback, &err.to_string()).await;
                Ok(())
            }
            Err(TicketError::Storage(err)) => {
                self.answer_callback(callback, "Something went wrong, try again")
                    .await;
                Err(err)
            }
        }
    }

    /// Treats the moderator's message as the response to the ticket they
    /// chose to answer. Returns whether the message was consumed.
    pub(crate) async fn handle_pending_response(
        &self,
        message: &IncomingMessage,
    ) -> Result<bool, anyhow::Error> {
        let Some(pending) = self
            .tickets
            .take_pending_response(message.chat_id, message.from.id)
            .await
        else {
            return Ok(false);
        };
        let id = pending.ticket_id;
        match self.tickets.respond(id, &message.from, message.text()).await {
            Ok(ticket) => {
                self.finish_triage(
                    message.chat_id,
                    pending.triage_message_id,
                    &ticket,
                    &message.from,
                )
                .await;
            }
            Err(TicketError::EmptyBody) => {
                // Photos and stickers don't count, keep waiting for text
                if let Err(err) = self
                    .tickets
                    .begin_response(
                        message.chat_id,
                        message.from.id,
                        id,
                        pending.triage_message_id,
                    )
                    .await
                {
                    log::debug!("Ticket #{id} can no longer be answered: {err}");
                }
                self.reply(
                    message,
                    "✍️ The response must be text\\. Try again, or send /cancel\\.",
                )
                .await;
            }
            Err(err @ (TicketError::AlreadyTerminal(_) | TicketError::NotFound(_))) => {
                self.reply(message, format!("❌ {}", markdown::escape(&err.to_string())))
                    .await;
            }
            Err(TicketError::Storage(err)) => return Err(err),
        }
        Ok(true)
    }

    /// Removes the buttons from the triage message and posts the outcome
    /// under it.
    async fn finish_triage(
        &self,
        chat_id: ChatId,
        triage_message_id: MessageId,
        ticket: &Ticket,
        actor: &ChatUser,
    ) {
        self.remove_triage_buttons(chat_id, triage_message_id).await;
        self.dispatcher
            .send(
                chat_id,
                OutgoingMessage::text(notify::render_triage_outcome(ticket, actor))
                    .replying_to(triage_message_id),
            )
            .await;
    }

    async fn remove_triage_buttons(&self, chat_id: ChatId, message_id: MessageId) {
        if let Err(err) = self.gateway.remove_inline_buttons(chat_id, message_id).await {
            log::warn!("Failed to remove triage buttons: {err:?}");
        }
    }

    async fn answer_callback(&self, callback: &IncomingCallback, text: &str) {
        if let Err(err) = self.gateway.answer_callback(&callback.query_id, text).await {
            log::warn!("Failed to answer callback query: {err:?}");
        }
    }
}
