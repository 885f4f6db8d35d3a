mod moderation_commands;
mod support;
mod triage;

use modbot_common::gateway::{IncomingMessage, Keyboard, OutgoingMessage};

use crate::ModerationModule;

impl ModerationModule {
    /// Best-effort reply to `message`. `text` is MarkdownV2.
    async fn reply(&self, message: &IncomingMessage, text: impl Into<String>) {
        self.reply_with_keyboard(message, text, Keyboard::None).await;
    }

    async fn reply_with_keyboard(
        &self,
        message: &IncomingMessage,
        text: impl Into<String>,
        keyboard: Keyboard,
    ) {
        self.dispatcher
            .send(
                message.chat_id,
                OutgoingMessage::text(text)
                    .with_keyboard(keyboard)
                    .replying_to(message.message_id),
            )
            .await;
    }
}
