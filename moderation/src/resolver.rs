use std::sync::Arc;

use modbot_common::{
    gateway::{ChatGateway, ChatUser, MemberRank},
    teloxide::types::{ChatId, UserId},
};

use crate::error::ModerationError;

pub const UNSPECIFIED_REASON: &str = "Unspecified";

/// Who a command points at: the author of the replied-to message, or the
/// first token of the arguments.
#[derive(Debug, Clone, Copy)]
pub struct TargetSpec<'a> {
    pub reply_to: Option<&'a ChatUser>,
    pub args: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub subject: ChatUser,
    /// Known when the target came from a member lookup
    pub rank: Option<MemberRank>,
    /// Arguments left after the identifying token
    pub rest: String,
}

impl ResolvedTarget {
    pub fn reason(&self) -> String {
        reason_or_unspecified(&self.rest)
    }
}

pub fn reason_or_unspecified(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        UNSPECIFIED_REASON.to_string()
    } else {
        text.to_string()
    }
}

pub struct TargetResolver {
    gateway: Arc<dyn ChatGateway>,
}

impl TargetResolver {
    pub fn new(gateway: Arc<dyn ChatGateway>) -> Self {
        Self { gateway }
    }

    pub async fn resolve(
        &self,
        chat_id: ChatId,
        spec: TargetSpec<'_>,
    ) -> Result<ResolvedTarget, ModerationError> {
        let args = spec.args.trim();
        if let Some(reply_to) = spec.reply_to {
            return Ok(ResolvedTarget {
                subject: reply_to.clone(),
                rank: None,
                rest: args.to_string(),
            });
        }

        let (token, rest) = match args.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (args, ""),
        };
        let lookup = if let Some(username) = token.strip_prefix('@').filter(|u| !u.is_empty()) {
            self.gateway.find_member_by_username(chat_id, username).await
        } else if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
            let Ok(user_id) = token.parse::<u64>() else {
                return Err(ModerationError::TargetNotFound);
            };
            self.gateway.get_member(chat_id, UserId(user_id)).await
        } else {
            return Err(ModerationError::TargetNotFound);
        };

        match lookup {
            Ok(member) => Ok(ResolvedTarget {
                subject: member.user,
                rank: Some(member.rank),
                rest: rest.to_string(),
            }),
            Err(err) => {
                log::debug!("Failed to look up {token} in {chat_id}: {err:?}");
                Err(ModerationError::TargetNotFound)
            }
        }
    }
}
