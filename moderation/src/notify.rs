//! Audit lines for moderation actions and ticket transitions.
//!
//! Every `render_*` function is pure and returns MarkdownV2. Delivery is
//! best-effort: failures are logged and never fail the operation that
//! triggered them.

use std::{sync::Arc, time::Duration};

use modbot_common::{
    gateway::{ChatGateway, ChatUser, OutgoingMessage},
    teloxide::{
        types::{ChatId, MessageId},
        utils::markdown,
    },
    utils::{format_duration, user_mention},
};

use crate::{
    engine::Escalation,
    resolver::UNSPECIFIED_REASON,
    store::{ModerationStore, Ticket, Warning},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationAction {
    Ban,
    Mute,
    Unmute,
    Warn,
    Unwarn,
}

/// One audit line. `actor` is `None` for automatic actions.
pub fn render(
    action: ModerationAction,
    subject: &ChatUser,
    actor: Option<&ChatUser>,
    duration: Option<Duration>,
    reason: Option<&str>,
) -> String {
    let actor = actor.map_or_else(|| "System".to_string(), user_mention);
    let subject = user_mention(subject);
    let mut text = match action {
        ModerationAction::Ban => format!("💬 {actor} banned {subject}"),
        ModerationAction::Mute => format!("💬 {actor} muted {subject}"),
        ModerationAction::Unmute => format!("💬 {actor} unmuted {subject}"),
        ModerationAction::Warn => format!("💬 {actor} warned {subject}"),
        ModerationAction::Unwarn => format!("💬 {actor} removed a warning from {subject}"),
    };
    if let Some(duration) = duration {
        text.push_str(&format!(
            " for {}",
            markdown::escape(&format_duration(duration))
        ));
    }
    if let Some(reason) = reason
        .map(str::trim)
        .filter(|reason| !reason.is_empty() && *reason != UNSPECIFIED_REASON)
    {
        text.push_str(&format!("\nReason: {}", markdown::escape(reason)));
    }
    text
}

pub fn render_warning_count(
    subject: &ChatUser,
    count: usize,
    threshold: usize,
    escalation: Option<Escalation>,
) -> String {
    let mut text = format!(
        "⚠️ {} now has {count}/{threshold} warnings",
        user_mention(subject)
    );
    match escalation {
        Some(Escalation::Recommended) => {
            text.push_str("\n🚨 *Warning limit reached\\! Consider banning this user\\.*")
        }
        Some(Escalation::Banned) => {
            text.push_str("\n🚨 *Warning limit reached\\. The user has been banned\\.*")
        }
        None => {}
    }
    text
}

pub fn render_warning_removed(remaining: usize, threshold: usize) -> String {
    format!("✅ Warning removed\\. Remaining: {remaining}/{threshold}")
}

/// Lists the ten most recent warnings, newest first.
pub fn render_warning_list(subject: &ChatUser, warnings: &[Warning], threshold: usize) -> String {
    if warnings.is_empty() {
        return format!("✅ {} has no warnings\\.", user_mention(subject));
    }
    let mut text = format!(
        "📋 *Warnings of {}:*\nTotal: {}/{threshold}\n\n",
        user_mention(subject),
        warnings.len()
    );
    for (i, warning) in warnings.iter().rev().take(10).enumerate() {
        text.push_str(&format!(
            "{}\\. *{}*\n   🕐 {}\n",
            i + 1,
            markdown::escape(&warning.reason),
            markdown::escape(&warning.created_at.format("%d.%m.%Y %H:%M").to_string()),
        ));
    }
    if warnings.len() >= threshold {
        text.push_str("\n⚠️ *Warning limit reached\\!*");
    }
    text
}

/// Posted to the moderator channel when a ticket is submitted.
pub fn render_triage(ticket: &Ticket) -> String {
    let mut text = format!(
        "🆕 *Ticket \\#{}*\n📋 Type: {}\n👤 From: {}\n🆔 ID: {}\n",
        ticket.id,
        markdown::escape(&ticket.ticket_type.to_string()),
        markdown::escape(&ticket.display_name),
        markdown::code_inline(&ticket.requester_id.to_string()),
    );
    if let Some(username) = &ticket.username {
        text.push_str(&format!("🔗 {}\n", markdown::escape(&format!("@{username}"))));
    }
    text.push_str(&format!(
        "🕐 {}\n\n📝 *Message:*\n{}",
        markdown::escape(&ticket.created_at.format("%d.%m.%Y %H:%M:%S UTC").to_string()),
        markdown::escape(&ticket.body),
    ));
    text
}

/// Telegram's limit for photo captions, in UTF-16 code units.
pub const CAPTION_LIMIT: usize = 1024;

pub fn fits_caption(text: &str) -> bool {
    text.encode_utf16().count() <= CAPTION_LIMIT
}

/// Caption for a photo ticket whose full text doesn't fit under the photo.
pub fn render_triage_caption(ticket: &Ticket) -> String {
    format!(
        "🆕 *Ticket \\#{}*\n📋 Type: {}\n👤 From: {}\n\n📝 The full message follows below\\.",
        ticket.id,
        markdown::escape(&ticket.ticket_type.to_string()),
        markdown::escape(&ticket.display_name),
    )
}

pub fn render_submission_ack(ticket: &Ticket) -> String {
    format!(
        "✅ Your ticket has been received\\!\n📋 ID: \\#{}\n⏳ Moderators will review it soon\\.\n📨 You will be notified about the result\\.",
        ticket.id
    )
}

pub fn render_resolution_notice(ticket: &Ticket) -> String {
    format!(
        "✅ Your ticket \\#{} has been reviewed by a moderator\\.",
        ticket.id
    )
}

pub fn render_response_relay(ticket: &Ticket, response: &str) -> String {
    format!(
        "💬 Moderator response to your ticket \\#{} \\({}\\):\n\n{}",
        ticket.id,
        markdown::escape(&ticket.ticket_type.to_string()),
        markdown::escape(response),
    )
}

/// Posted under the triage message once a moderator has handled the ticket.
pub fn render_triage_outcome(ticket: &Ticket, actor: &ChatUser) -> String {
    match &ticket.response {
        Some(response) => format!(
            "💬 Ticket \\#{} answered by {}:\n{}",
            ticket.id,
            user_mention(actor),
            markdown::escape(response),
        ),
        None => format!(
            "✅ Ticket \\#{} marked as reviewed by {}",
            ticket.id,
            user_mention(actor)
        ),
    }
}

pub struct NotificationDispatcher {
    gateway: Arc<dyn ChatGateway>,
    store: Arc<dyn ModerationStore>,
}

impl NotificationDispatcher {
    pub fn new(gateway: Arc<dyn ChatGateway>, store: Arc<dyn ModerationStore>) -> Self {
        Self { gateway, store }
    }

    /// Appends the broadcast message, if one is set.
    pub async fn with_broadcast(&self, text: String) -> String {
        match self.store.get_broadcast_message().await {
            Ok(Some(broadcast)) => format!("{text}\n\n{}", markdown::escape(&broadcast.text)),
            Ok(None) => text,
            Err(err) => {
                log::warn!("Failed to read the broadcast message: {err:?}");
                text
            }
        }
    }

    /// Sends an audit line to the chat without notification sound. Returns
    /// whether it was delivered.
    pub async fn deliver(&self, chat_id: ChatId, text: String) -> bool {
        let text = self.with_broadcast(text).await;
        self.send(chat_id, OutgoingMessage::text(text).silent())
            .await
            .is_some()
    }

    /// Sends anything else (ticket messages, replies) without the broadcast.
    pub async fn send(&self, chat_id: ChatId, message: OutgoingMessage) -> Option<MessageId> {
        match self.gateway.send_message(chat_id, message).await {
            Ok(message_id) => Some(message_id),
            Err(err) => {
                log::warn!("Failed to deliver a notification to {chat_id}: {err:?}");
                None
            }
        }
    }
}
