use std::time::Duration;

use modbot_common::{
    bot_commands::Command,
    gateway::IncomingMessage,
    teloxide::utils::markdown,
};

use crate::{
    engine::{parse_restriction_duration, split_duration, Escalation, WARNING_THRESHOLD},
    error::ModerationError,
    notify::{self, ModerationAction},
    resolver::{reason_or_unspecified, TargetSpec},
    store::BroadcastMessage,
    ModerationModule,
};

fn target_spec<'a>(message: &'a IncomingMessage, args: &'a str) -> TargetSpec<'a> {
    TargetSpec {
        reply_to: message.reply_to.as_ref(),
        args,
    }
}

impl ModerationModule {
    pub(crate) async fn handle_moderation_command(
        &self,
        message: &IncomingMessage,
        command: Command,
    ) -> Result<(), anyhow::Error> {
        if message.is_private() {
            self.reply(message, "This command only works in groups\\.")
                .await;
            return Ok(());
        }
        if let Some(allowed_chat_id) = self.config.allowed_chat_id {
            if message.chat_id != allowed_chat_id {
                log::debug!(
                    "Ignoring moderation command in {}, only {allowed_chat_id} is allowed",
                    message.chat_id
                );
                self.reply(message, "This bot doesn't moderate this chat\\.")
                    .await;
                return Ok(());
            }
        }

        let result = match command {
            Command::Ban(args) => self.ban(message, &args).await,
            Command::Mute(args) => self.mute(message, &args).await,
            Command::Unmute(args) => self.unmute(message, &args).await,
            Command::Warn(args) => self.warn(message, &args).await,
            Command::Unwarn(args) => self.unwarn(message, &args).await,
            Command::Warns(args) => self.list_warnings(message, &args).await,
            _ => return Ok(()),
        };
        match result {
            Ok(()) => Ok(()),
            Err(ModerationError::InsufficientPrivilege) => {
                log::debug!(
                    "Deleting moderation attempt by non-admin {} in {}",
                    message.from.id,
                    message.chat_id
                );
                if let Err(err) = self
                    .gateway
                    .delete_message(message.chat_id, message.message_id)
                    .await
                {
                    log::warn!("Failed to delete message: {err:?}");
                }
                Ok(())
            }
            Err(ModerationError::Transport(err)) => {
                log::warn!("Failed to apply restriction in {}: {err:?}", message.chat_id);
                self.reply(
                    message,
                    "❌ Telegram refused the action\\. Check that the bot is an administrator with permission to restrict members\\.",
                )
                .await;
                Ok(())
            }
            Err(ModerationError::Storage(err)) => Err(err),
            Err(err) => {
                self.reply(message, format!("❌ {}", markdown::escape(&err.to_string())))
                    .await;
                Ok(())
            }
        }
    }

    async fn ban(&self, message: &IncomingMessage, args: &str) -> Result<(), ModerationError> {
        let target = self
            .engine
            .resolve_and_authorize(&message.from, target_spec(message, args), message.chat_id)
            .await?;
        self.engine
            .execute_ban(message.chat_id, target.subject.id)
            .await?;
        let text = notify::render(
            ModerationAction::Ban,
            &target.subject,
            Some(&message.from),
            None,
            Some(&target.reason()),
        );
        self.dispatcher.deliver(message.chat_id, text).await;
        Ok(())
    }

    async fn mute(&self, message: &IncomingMessage, args: &str) -> Result<(), ModerationError> {
        let target = self
            .engine
            .resolve_and_authorize(&message.from, target_spec(message, args), message.chat_id)
            .await?;
        let (duration, reason) = split_duration(&target.rest);
        let minutes = parse_restriction_duration(duration.unwrap_or_default());
        self.engine
            .execute_mute(message.chat_id, target.subject.id, minutes)
            .await?;
        let text = notify::render(
            ModerationAction::Mute,
            &target.subject,
            Some(&message.from),
            Some(Duration::from_secs(minutes * 60)),
            Some(&reason_or_unspecified(reason)),
        );
        self.dispatcher.deliver(message.chat_id, text).await;
        Ok(())
    }

    async fn unmute(&self, message: &IncomingMessage, args: &str) -> Result<(), ModerationError> {
        let target = self
            .engine
            .resolve_subject(&message.from, target_spec(message, args), message.chat_id)
            .await?;
        self.engine
            .execute_unmute(message.chat_id, target.subject.id)
            .await?;
        let text = notify::render(
            ModerationAction::Unmute,
            &target.subject,
            Some(&message.from),
            None,
            Some(&target.reason()),
        );
        self.dispatcher.deliver(message.chat_id, text).await;
        Ok(())
    }

    async fn warn(&self, message: &IncomingMessage, args: &str) -> Result<(), ModerationError> {
        let target = self
            .engine
            .resolve_and_authorize(&message.from, target_spec(message, args), message.chat_id)
            .await?;
        let reason = target.reason();
        let outcome = self
            .engine
            .issue_warning(
                message.chat_id,
                target.subject.id,
                reason.clone(),
                message.from.id,
            )
            .await?;
        let text = format!(
            "{}\n\n{}",
            notify::render(
                ModerationAction::Warn,
                &target.subject,
                Some(&message.from),
                None,
                Some(&reason),
            ),
            notify::render_warning_count(
                &target.subject,
                outcome.count,
                WARNING_THRESHOLD,
                outcome.escalation,
            )
        );
        self.dispatcher.deliver(message.chat_id, text).await;
        if outcome.escalation == Some(Escalation::Banned) {
            let text = notify::render(
                ModerationAction::Ban,
                &target.subject,
                None,
                None,
                Some(&format!("{WARNING_THRESHOLD}/{WARNING_THRESHOLD} warnings")),
            );
            self.dispatcher.deliver(message.chat_id, text).await;
        }
        Ok(())
    }

    async fn unwarn(&self, message: &IncomingMessage, args: &str) -> Result<(), ModerationError> {
        let target = self
            .engine
            .resolve_subject(&message.from, target_spec(message, args), message.chat_id)
            .await?;
        let remaining = self
            .engine
            .revoke_last_warning(message.chat_id, target.subject.id)
            .await?;
        let text = format!(
            "{}\n{}",
            notify::render(
                ModerationAction::Unwarn,
                &target.subject,
                Some(&message.from),
                None,
                None,
            ),
            notify::render_warning_removed(remaining, WARNING_THRESHOLD)
        );
        self.dispatcher.deliver(message.chat_id, text).await;
        Ok(())
    }

    async fn list_warnings(
        &self,
        message: &IncomingMessage,
        args: &str,
    ) -> Result<(), ModerationError> {
        let target = self
            .engine
            .resolve_subject(&message.from, target_spec(message, args), message.chat_id)
            .await?;
        let warnings = self
            .engine
            .warnings(message.chat_id, target.subject.id)
            .await?;
        self.reply(
            message,
            notify::render_warning_list(&target.subject, &warnings, WARNING_THRESHOLD),
        )
        .await;
        Ok(())
    }

    pub(crate) async fn handle_set_broadcast(
        &self,
        message: &IncomingMessage,
        text: &str,
    ) -> Result<(), anyhow::Error> {
        if message.from.id != self.config.owner_id {
            self.reply(message, "❌ Only the bot owner can do this\\.")
                .await;
            return Ok(());
        }
        let text = text.trim();
        if text.is_empty() {
            self.reply(message, "Usage: `/set_broadcast <text>`").await;
            return Ok(());
        }
        self.store
            .set_broadcast_message(BroadcastMessage {
                text: text.to_string(),
                owner_id: message.from.id,
            })
            .await?;
        log::info!("Broadcast message set by {}", message.from.id);
        self.reply(
            message,
            format!(
                "✅ Broadcast message set\\. It will be added to every moderation notice:\n\n{}",
                markdown::escape(text)
            ),
        )
        .await;
        Ok(())
    }

    pub(crate) async fn handle_clear_broadcast(
        &self,
        message: &IncomingMessage,
    ) -> Result<(), anyhow::Error> {
        if message.from.id != self.config.owner_id {
            self.reply(message, "❌ Only the bot owner can do this\\.")
                .await;
            return Ok(());
        }
        let text = if self.store.clear_broadcast_message().await? {
            log::info!("Broadcast message cleared by {}", message.from.id);
            "✅ Broadcast message cleared\\."
        } else {
            "There is no broadcast message\\."
        };
        self.reply(message, text).await;
        Ok(())
    }
}
