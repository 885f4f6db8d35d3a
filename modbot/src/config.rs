use std::time::Duration;

use anyhow::Context;
use modbot_common::teloxide::types::{ChatId, UserId};
use moderation::ModerationConfig;
use reqwest::Url;

const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;
const DEFAULT_SESSION_CAPACITY: usize = 10_000;

pub struct Config {
    pub bot_token: String,
    pub telegram_api_url: Url,
    /// No database means everything is kept in memory
    pub mongodb_uri: Option<String>,
    pub moderation: ModerationConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let telegram_api_url = match std::env::var("TELEGRAM_API_URL") {
            Ok(url) => url.parse().context("Invalid TELEGRAM_API_URL")?,
            Err(_) => "https://api.telegram.org".parse()?,
        };
        Ok(Self {
            bot_token: required("BOT_TOKEN")?,
            telegram_api_url,
            mongodb_uri: std::env::var("MONGODB_URI").ok(),
            moderation: ModerationConfig {
                owner_id: UserId(parse_required("BOT_OWNER_ID")?),
                support_chat_id: ChatId(parse_required("SUPPORT_CHAT_ID")?),
                allowed_chat_id: parse_optional("ALLOWED_CHAT_ID")?.map(ChatId),
                escalation: parse_optional("WARN_LIMIT_ACTION")?.unwrap_or_default(),
                session_idle: Duration::from_secs(
                    parse_optional("TICKET_SESSION_IDLE_SECS")?
                        .unwrap_or(DEFAULT_SESSION_IDLE_SECS),
                ),
                session_capacity: parse_optional("TICKET_SESSION_CAPACITY")?
                    .unwrap_or(DEFAULT_SESSION_CAPACITY),
            },
        })
    }
}

fn required(name: &str) -> Result<String, anyhow::Error> {
    std::env::var(name).with_context(|| format!("{name} not set"))
}

fn parse_required<T>(name: &str) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = required(name)?;
    value
        .trim()
        .parse()
        .map_err(|err| anyhow::anyhow!("Invalid {name} {value:?}: {err}"))
}

fn parse_optional<T>(name: &str) -> Result<Option<T>, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|err| anyhow::anyhow!("Invalid {name} {value:?}: {err}")),
        _ => Ok(None),
    }
}

