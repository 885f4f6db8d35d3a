use modbot_common::{
    gateway::{IncomingMessage, Keyboard},
    teloxide::utils::markdown,
};

use crate::{
    error::TicketError,
    menu,
    store::TicketType,
    tickets::BodyOutcome,
    ModerationModule,
};

const WELCOME: &str = "🤖 *Welcome\\!*

I moderate a community chat\\. Here is what I can do:

📌 *In private messages:*
• Show your ID
• Contact support
• Show help

📌 *In the group \\(for admins\\):*
• /ban ban a user
• /mute mute a user
• /warn warn a user
• /unwarn remove the last warning
• /warns show a user's warnings";

const HELP: &str = "📋 *Commands*

*For admins in the group* \\(reply to a message, or pass @username or an ID\\):
/ban \\[reason\\] ban a user
/mute \\[duration\\] \\[reason\\] mute a user, 30 minutes by default
/unmute unmute a user
/warn \\[reason\\] warn a user, 3 warnings is the limit
/unwarn remove the last warning
/warns list a user's warnings

*For everyone:*
/start about this bot
/help this message
/id your Telegram ID
/cancel abandon a support request

*For the bot owner:*
/set\\_broadcast \\[text\\] add a message to every moderation notice
/clear\\_broadcast remove it

*Examples:*
/ban rule violation
/mute 2h spam
/warn insults";

const SUPPORT_INTRO: &str = "🆘 *Support*

Choose what you need:

📝 *Appeal a punishment* if you think a punishment was unfair
⚠️ *Report a user* to complain about another member
💡 *Suggest an improvement* to share your ideas

Your request will be sent to the moderators\\.";

fn prompt_for(ticket_type: TicketType) -> &'static str {
    match ticket_type {
        TicketType::Appeal => {
            "📝 *Appeal a punishment*

Please describe:
1\\. What punishment you received
2\\. Why you think it was unfair
3\\. Any evidence

You can attach a photo\\. Send text, or a photo with a caption\\."
        }
        TicketType::Complaint => {
            "⚠️ *Report a user*

Please describe:
1\\. Who you are reporting \\(ID or @username\\)
2\\. What happened
3\\. When it happened
4\\. Evidence \\(screenshots etc\\.\\)

You can attach a photo\\. Send text, or a photo with a caption\\."
        }
        TicketType::Suggestion => {
            "💡 *Suggest an improvement*

Please describe:
1\\. What you would like to improve
2\\. How it helps the community
3\\. Any details on how to do it

You can attach a photo\\. Send text, or a photo with a caption\\."
        }
        TicketType::Inquiry => "✍️ Describe your request\\. You can attach a photo\\.",
    }
}

impl ModerationModule {
    pub(crate) async fn handle_start(&self, message: &IncomingMessage) -> Result<(), anyhow::Error> {
        let text = self.dispatcher.with_broadcast(WELCOME.to_string()).await;
        let keyboard = if message.is_private() {
            menu::main_menu()
        } else {
            Keyboard::None
        };
        self.reply_with_keyboard(message, text, keyboard).await;
        Ok(())
    }

    pub(crate) async fn handle_help(&self, message: &IncomingMessage) -> Result<(), anyhow::Error> {
        self.reply(message, HELP).await;
        Ok(())
    }

    pub(crate) async fn handle_id(&self, message: &IncomingMessage) -> Result<(), anyhow::Error> {
        let user = &message.from;
        let mut text = format!(
            "👤 *Your details:*\n\n🆔 ID: {}\n📛 Name: {}\n",
            markdown::code_inline(&user.id.to_string()),
            markdown::escape(&user.full_name()),
        );
        if let Some(username) = &user.username {
            text.push_str(&format!(
                "🔗 Username: {}\n",
                markdown::escape(&format!("@{username}"))
            ));
        }
        self.reply(message, text).await;
        Ok(())
    }

    pub(crate) async fn handle_cancel(&self, message: &IncomingMessage) -> Result<(), anyhow::Error> {
        let had_response = self
            .tickets
            .take_pending_response(message.chat_id, message.from.id)
            .await
            .is_some();
        let had_session = message.is_private() && self.tickets.cancel(message.from.id).await;
        let text = if had_response || had_session {
            "Cancelled\\."
        } else {
            "Nothing to cancel\\."
        };
        let keyboard = if message.is_private() {
            menu::main_menu()
        } else {
            Keyboard::None
        };
        self.reply_with_keyboard(message, text, keyboard).await;
        Ok(())
    }

    pub(crate) async fn handle_private_message(
        &self,
        message: &IncomingMessage,
    ) -> Result<(), anyhow::Error> {
        let requester = &message.from;
        match message.text() {
            menu::MY_ID => return self.handle_id(message).await,
            menu::HELP => return self.handle_help(message).await,
            menu::SUPPORT => {
                self.tickets.open_menu(requester.id).await;
                self.reply_with_keyboard(message, SUPPORT_INTRO, menu::support_menu())
                    .await;
                return Ok(());
            }
            menu::BACK => {
                self.tickets.cancel(requester.id).await;
                self.reply_with_keyboard(message, "Back to the main menu\\.", menu::main_menu())
                    .await;
                return Ok(());
            }
            label => {
                if let Some(ticket_type) = menu::ticket_type_for(label) {
                    self.tickets.select_type(requester.id, ticket_type).await;
                    self.reply_with_keyboard(
                        message,
                        prompt_for(ticket_type),
                        Keyboard::RemoveMenu,
                    )
                    .await;
                    return Ok(());
                }
            }
        }

        let outcome = self
            .tickets
            .receive_body(requester, message.text.as_deref(), message.photo.clone())
            .await;
        match outcome {
            Ok(BodyOutcome::Submitted(_)) => {}
            Ok(BodyOutcome::NoSession) => {
                self.reply_with_keyboard(
                    message,
                    "Use the menu below, or /help for the list of commands\\.",
                    menu::main_menu(),
                )
                .await;
            }
            Ok(BodyOutcome::NeedBody) => {
                let ticket_type = self
                    .tickets
                    .session(requester.id)
                    .await
                    .and_then(|session| session.ticket_type)
                    .unwrap_or(TicketType::Inquiry);
                self.reply(message, prompt_for(ticket_type)).await;
            }
            Ok(BodyOutcome::NeedCaption) => {
                self.reply(
                    message,
                    "📷 Photo received\\. Now send the text of your request\\.",
                )
                .await;
            }
            Err(TicketError::EmptyBody) => {
                self.reply_with_keyboard(
                    message,
                    "❌ The text can't be empty\\. Open Support to start again\\.",
                    menu::main_menu(),
                )
                .await;
            }
            Err(err) => {
                self.reply_with_keyboard(
                    message,
                    "❌ Failed to send your request\\. Please try again later\\.",
                    menu::main_menu(),
                )
                .await;
                return Err(err.into());
            }
        }
        Ok(())
    }
}
