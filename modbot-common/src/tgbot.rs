use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::warn;
use teloxide::adaptors::throttle::Throttle;
use teloxide::adaptors::CacheMe;
use teloxide::dispatching::UpdateFilterExt;
use teloxide::payloads::{
    AnswerCallbackQuerySetters, RestrictChatMemberSetters, SendMessageSetters, SendPhotoSetters,
};
use teloxide::prelude::{dptree, CallbackQuery, Dispatcher, Message, Requester, Update};
use teloxide::types::{
    ChatId, ChatPermissions, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
    KeyboardButton, KeyboardMarkup, KeyboardRemove, LinkPreviewOptions, MessageId, ParseMode,
    ReplyMarkup, ReplyParameters, UserId,
};
use teloxide::{ApiError, Bot, RequestError};

use crate::gateway::{
    ChatGateway, ChatMemberInfo, ChatUser, IncomingCallback, IncomingMessage, Keyboard,
    OutgoingMessage,
};
use crate::hub::HubState;

pub type TgBot = CacheMe<Throttle<Bot>>;

pub struct BotData {
    bot: TgBot,
    bot_id: UserId,
    hub: Arc<HubState>,
    /// Lowercased handle -> id of every user seen in any update. The Bot API
    /// has no lookup by handle, so this is the only way to resolve `@mentions`.
    known_usernames: DashMap<String, UserId>,
}

impl BotData {
    pub async fn new(bot: TgBot, hub: Arc<HubState>) -> Result<Self, anyhow::Error> {
        let bot_id = bot.get_me().await?.id;
        Ok(Self {
            bot,
            bot_id,
            hub,
            known_usernames: DashMap::new(),
        })
    }

    pub fn bot(&self) -> &TgBot {
        &self.bot
    }

    pub fn id(&self) -> UserId {
        self.bot_id
    }

    pub fn remember_user(&self, user: &ChatUser) {
        if let Some(username) = &user.username {
            self.known_usernames
                .insert(username.to_lowercase(), user.id);
        }
    }

    pub async fn start_polling(self: &Arc<Self>) -> Result<(), anyhow::Error> {
        let bot = self.bot.clone();
        let (msg_sender, mut msg_receiver) = tokio::sync::mpsc::channel(1000);
        let (callback_query_sender, mut callback_query_receiver) = tokio::sync::mpsc::channel(1000);

        tokio::spawn(async move {
            let handler = dptree::entry()
                .branch(Update::filter_message().endpoint(move |msg: Message| {
                    let msg_sender = msg_sender.clone();
                    async move {
                        if let Err(err) = msg_sender.send(msg).await {
                            warn!("Message channel closed: {err}");
                        }
                        Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                    }
                }))
                .branch(Update::filter_callback_query().endpoint(
                    move |callback_query: CallbackQuery| {
                        let callback_query_sender = callback_query_sender.clone();
                        async move {
                            if let Err(err) = callback_query_sender.send(callback_query).await {
                                warn!("Callback query channel closed: {err}");
                            }
                            Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
                        }
                    },
                ));
            Dispatcher::builder(bot, handler).build().dispatch().await;
        });

        let me = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(msg) = msg_receiver.recv().await {
                let me = Arc::clone(&me);
                tokio::spawn(async move {
                    let Some(message) = classify_message(&msg) else {
                        return;
                    };
                    me.remember_user(&message.from);
                    if let Some(reply_to) = &message.reply_to {
                        me.remember_user(reply_to);
                    }
                    for module in me.hub.bot_modules().await.iter() {
                        log::debug!(
                            "chat={:?} message: {}, module: {}",
                            message.chat_id,
                            message.text(),
                            module.name()
                        );
                        if let Err(err) = module.handle_message(&message).await {
                            warn!(
                                "Error handling message {} in module {}: {:?}",
                                message.text(),
                                module.name(),
                                err
                            );
                        }
                    }
                });
            }
        });

        let me = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(callback_query) = callback_query_receiver.recv().await {
                let me = Arc::clone(&me);
                tokio::spawn(async move {
                    let Some(callback) = classify_callback(&callback_query) else {
                        if let Err(err) = me.bot.answer_callback_query(&callback_query.id).await {
                            warn!("Error answering callback query: {err:?}");
                        }
                        return;
                    };
                    me.remember_user(&callback.from);
                    for module in me.hub.bot_modules().await.iter() {
                        log::debug!("Callback data: {}, module: {}", callback.data, module.name());
                        if let Err(err) = module.handle_callback(&callback).await {
                            warn!(
                                "Error handling callback data {} in module {}: {:?}",
                                callback.data,
                                module.name(),
                                err
                            );
                        }
                    }
                });
            }
        });
        Ok(())
    }
}

fn classify_message(msg: &Message) -> Option<IncomingMessage> {
    let from = ChatUser::from(msg.from.as_ref()?);
    Some(IncomingMessage {
        chat_id: msg.chat.id,
        message_id: msg.id,
        from,
        text: msg.text().or(msg.caption()).map(|s| s.to_owned()),
        photo: msg
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|photo| photo.file.id.clone()),
        reply_to: msg
            .reply_to_message()
            .and_then(|reply| reply.from.as_ref())
            .map(ChatUser::from),
    })
}

fn classify_callback(callback_query: &CallbackQuery) -> Option<IncomingCallback> {
    let data = callback_query.data.clone()?;
    let message = callback_query.message.as_ref()?;
    Some(IncomingCallback {
        query_id: callback_query.id.clone(),
        from: ChatUser::from(&callback_query.from),
        chat_id: message.chat().id,
        message_id: message.id(),
        data,
    })
}

fn to_reply_markup(keyboard: Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Inline(rows) => Some(ReplyMarkup::InlineKeyboard(InlineKeyboardMarkup::new(
            rows.into_iter().map(|row| {
                row.into_iter()
                    .map(|button| {
                        InlineKeyboardButton::callback(button.label, button.action.to_string())
                    })
                    .collect::<Vec<_>>()
            }),
        ))),
        Keyboard::Menu(rows) => Some(ReplyMarkup::Keyboard(KeyboardMarkup::new(
            rows.into_iter()
                .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>()),
        ))),
        Keyboard::RemoveMenu => Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new())),
    }
}

fn log_parse_error(text: impl Into<String>) -> impl FnOnce(&RequestError) {
    let text = text.into();
    move |err| {
        if let RequestError::Api(ApiError::CantParseEntities(s)) = err {
            log::warn!("Can't parse entities in message: {s}\n{text:?}");
        }
    }
}

#[async_trait]
impl ChatGateway for BotData {
    async fn get_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<ChatMemberInfo, anyhow::Error> {
        let member = self.bot.get_chat_member(chat_id, user_id).await?;
        let info = ChatMemberInfo::from(&member);
        self.remember_user(&info.user);
        Ok(info)
    }

    async fn find_member_by_username(
        &self,
        chat_id: ChatId,
        username: &str,
    ) -> Result<ChatMemberInfo, anyhow::Error> {
        let user_id = self
            .known_usernames
            .get(&username.to_lowercase())
            .map(|entry| *entry.value())
            .ok_or_else(|| anyhow::anyhow!("No known user with handle @{username}"))?;
        self.get_member(chat_id, user_id).await
    }

    async fn ban_member(&self, chat_id: ChatId, user_id: UserId) -> Result<(), anyhow::Error> {
        self.bot.ban_chat_member(chat_id, user_id).await?;
        Ok(())
    }

    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        self.bot
            .restrict_chat_member(chat_id, user_id, ChatPermissions::empty())
            .until_date(until)
            .await?;
        Ok(())
    }

    async fn lift_restrictions(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<(), anyhow::Error> {
        self.bot
            .restrict_chat_member(chat_id, user_id, ChatPermissions::all())
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: ChatId,
        message: OutgoingMessage,
    ) -> Result<MessageId, anyhow::Error> {
        let OutgoingMessage {
            text,
            photo,
            keyboard,
            reply_to,
            silent,
        } = message;
        let reply_parameters = reply_to.map(|message_id| ReplyParameters {
            message_id,
            allow_sending_without_reply: Some(true),
            ..Default::default()
        });
        let reply_markup = to_reply_markup(keyboard);
        let sent = if let Some(file_id) = photo {
            let mut request = self
                .bot
                .send_photo(chat_id, InputFile::file_id(file_id))
                .caption(text.clone())
                .parse_mode(ParseMode::MarkdownV2)
                .disable_notification(silent);
            if let Some(reply_markup) = reply_markup {
                request = request.reply_markup(reply_markup);
            }
            if let Some(reply_parameters) = reply_parameters {
                request = request.reply_parameters(reply_parameters);
            }
            request.await.inspect_err(log_parse_error(text))?
        } else {
            let mut request = self
                .bot
                .send_message(chat_id, text.clone())
                .parse_mode(ParseMode::MarkdownV2)
                .disable_notification(silent)
                .link_preview_options(LinkPreviewOptions {
                    is_disabled: true,
                    url: None,
                    prefer_small_media: false,
                    prefer_large_media: false,
                    show_above_text: false,
                });
            if let Some(reply_markup) = reply_markup {
                request = request.reply_markup(reply_markup);
            }
            if let Some(reply_parameters) = reply_parameters {
                request = request.reply_parameters(reply_parameters);
            }
            request.await.inspect_err(log_parse_error(text))?
        };
        Ok(sent.id)
    }

    async fn delete_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), anyhow::Error> {
        self.bot.delete_message(chat_id, message_id).await?;
        Ok(())
    }

    async fn remove_inline_buttons(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<(), anyhow::Error> {
        self.bot
            .edit_message_reply_markup(chat_id, message_id)
            .await?;
        Ok(())
    }

    async fn answer_callback(&self, query_id: &str, text: &str) -> Result<(), anyhow::Error> {
        self.bot.answer_callback_query(query_id).text(text).await?;
        Ok(())
    }
}
