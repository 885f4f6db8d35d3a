use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TicketId(pub i64);

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Moderator decision on a pending ticket, carried in inline button callback
/// data as `<verb>:<ticketId>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriageAction {
    Resolve(TicketId),
    Respond(TicketId),
}

impl TriageAction {
    pub fn ticket_id(&self) -> TicketId {
        match self {
            TriageAction::Resolve(id) | TriageAction::Respond(id) => *id,
        }
    }
}

impl fmt::Display for TriageAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriageAction::Resolve(id) => write!(f, "resolve:{id}"),
            TriageAction::Respond(id) => write!(f, "respond:{id}"),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CallbackDataError {
    #[error("callback data has no `:` separator")]
    MissingSeparator,
    #[error("unknown triage verb `{0}`")]
    UnknownVerb(String),
    #[error("invalid ticket id `{0}`")]
    InvalidTicketId(String),
}

impl FromStr for TriageAction {
    type Err = CallbackDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (verb, id) = s
            .split_once(':')
            .ok_or(CallbackDataError::MissingSeparator)?;
        let id = match id.parse::<i64>() {
            Ok(id) if id > 0 => TicketId(id),
            _ => return Err(CallbackDataError::InvalidTicketId(id.to_owned())),
        };
        match verb {
            "resolve" => Ok(TriageAction::Resolve(id)),
            "respond" => Ok(TriageAction::Respond(id)),
            other => Err(CallbackDataError::UnknownVerb(other.to_owned())),
        }
    }
}

/// A slash command recognized by the bot. Arguments are the raw text after
/// the command token, trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Id,
    Cancel,
    Ban(String),
    Mute(String),
    Unmute(String),
    Warn(String),
    Unwarn(String),
    Warns(String),
    SetBroadcast(String),
    ClearBroadcast,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start().strip_prefix('/')?;
        let (token, args) = match text.split_once(char::is_whitespace) {
            Some((token, args)) => (token, args.trim().to_owned()),
            None => (text, String::new()),
        };
        // `/warn@SomeBot` is what Telegram sends in groups with several bots
        let name = token.split('@').next().unwrap_or_default().to_lowercase();
        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "id" => Command::Id,
            "cancel" => Command::Cancel,
            "ban" => Command::Ban(args),
            "mute" => Command::Mute(args),
            "unmute" => Command::Unmute(args),
            "warn" => Command::Warn(args),
            "unwarn" => Command::Unwarn(args),
            "warns" => Command::Warns(args),
            "set_broadcast" | "add" => Command::SetBroadcast(args),
            "clear_broadcast" | "clear_msg" => Command::ClearBroadcast,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triage_action_roundtrips_through_callback_data() {
        let action = TriageAction::Respond(TicketId(42));
        assert_eq!(action.to_string(), "respond:42");
        assert_eq!("respond:42".parse::<TriageAction>(), Ok(action));
        assert_eq!(
            "resolve:7".parse::<TriageAction>(),
            Ok(TriageAction::Resolve(TicketId(7)))
        );
    }

    #[test]
    fn malformed_callback_data_is_rejected() {
        assert_eq!(
            "resolve_7".parse::<TriageAction>(),
            Err(CallbackDataError::MissingSeparator)
        );
        assert_eq!(
            "close:7".parse::<TriageAction>(),
            Err(CallbackDataError::UnknownVerb("close".to_string()))
        );
        assert_eq!(
            "resolve:abc".parse::<TriageAction>(),
            Err(CallbackDataError::InvalidTicketId("abc".to_string()))
        );
        assert_eq!(
            "resolve:-3".parse::<TriageAction>(),
            Err(CallbackDataError::InvalidTicketId("-3".to_string()))
        );
        assert!("resolve:".parse::<TriageAction>().is_err());
    }

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            Command::parse("/warn @bob spam links"),
            Some(Command::Warn("@bob spam links".to_string()))
        );
        assert_eq!(
            Command::parse("/mute@ModBot 10 flood"),
            Some(Command::Mute("10 flood".to_string()))
        );
        assert_eq!(Command::parse("/BAN"), Some(Command::Ban(String::new())));
        assert_eq!(
            Command::parse("/add Be nice"),
            Some(Command::SetBroadcast("Be nice".to_string()))
        );
        assert_eq!(Command::parse("/clear_msg"), Some(Command::ClearBroadcast));
    }

    #[test]
    fn ignores_plain_text_and_unknown_commands() {
        assert_eq!(Command::parse("hello /ban"), None);
        assert_eq!(Command::parse("/kick @bob"), None);
        assert_eq!(Command::parse(""), None);
    }
}
