use std::{future::Future, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::lock::Mutex;
use modbot_common::{
    gateway::{ChatGateway, ChatUser},
    teloxide::types::{ChatId, UserId},
    utils::parse_duration,
};

use crate::{
    error::ModerationError,
    resolver::{ResolvedTarget, TargetResolver, TargetSpec},
    store::{ModerationStore, Warning},
};

pub const WARNING_THRESHOLD: usize = 3;
pub const DEFAULT_RESTRICTION_MINUTES: u64 = 30;
/// 30 days
pub const MAX_RESTRICTION_MINUTES: u64 = 43200;

/// What happens when a warning brings the count to [`WARNING_THRESHOLD`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscalationPolicy {
    #[default]
    Recommend,
    AutoBan,
}

impl FromStr for EscalationPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recommend" => Ok(EscalationPolicy::Recommend),
            "ban" => Ok(EscalationPolicy::AutoBan),
            other => Err(anyhow::anyhow!(
                "Unknown warn limit action `{other}`, expected `recommend` or `ban`"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    Recommended,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarningOutcome {
    pub count: usize,
    pub escalation: Option<Escalation>,
}

type LedgerKey = (ChatId, UserId);

pub struct ModerationEngine {
    gateway: Arc<dyn ChatGateway>,
    store: Arc<dyn ModerationStore>,
    resolver: TargetResolver,
    policy: EscalationPolicy,
    ledger_locks: DashMap<LedgerKey, Arc<Mutex<()>>>,
}

impl ModerationEngine {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        store: Arc<dyn ModerationStore>,
        policy: EscalationPolicy,
    ) -> Self {
        Self {
            resolver: TargetResolver::new(Arc::clone(&gateway)),
            gateway,
            store,
            policy,
            ledger_locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> EscalationPolicy {
        self.policy
    }

    /// Fails with `InsufficientPrivilege` unless `actor` is an administrator
    /// or the owner of `chat_id`. A failed lookup counts as no privilege.
    pub async fn authorize_actor(
        &self,
        chat_id: ChatId,
        actor: UserId,
    ) -> Result<(), ModerationError> {
        match self.gateway.get_member(chat_id, actor).await {
            Ok(member) if member.rank.is_privileged() => Ok(()),
            Ok(_) => Err(ModerationError::InsufficientPrivilege),
            Err(err) => {
                log::debug!("Failed to check rank of {actor} in {chat_id}: {err:?}");
                Err(ModerationError::InsufficientPrivilege)
            }
        }
    }

    /// Authorizes the actor and resolves the target, without the immunity
    /// checks. Used for actions that only relieve a subject.
    pub async fn resolve_subject(
        &self,
        actor: &ChatUser,
        spec: TargetSpec<'_>,
        chat_id: ChatId,
    ) -> Result<ResolvedTarget, ModerationError> {
        self.authorize_actor(chat_id, actor.id).await?;
        self.resolver.resolve(chat_id, spec).await
    }

    /// Shared gate for ban, mute and warn.
    pub async fn resolve_and_authorize(
        &self,
        actor: &ChatUser,
        spec: TargetSpec<'_>,
        chat_id: ChatId,
    ) -> Result<ResolvedTarget, ModerationError> {
        let mut target = self.resolve_subject(actor, spec, chat_id).await?;
        if target.subject.id == actor.id {
            return Err(ModerationError::SelfTargetForbidden);
        }
        if target.subject.is_bot {
            return Err(ModerationError::BotTargetForbidden);
        }
        if target.rank.is_none() {
            // Reply targets come without a rank
            target.rank = match self.gateway.get_member(chat_id, target.subject.id).await {
                Ok(member) => Some(member.rank),
                Err(err) => {
                    log::debug!(
                        "Failed to check rank of {} in {chat_id}: {err:?}",
                        target.subject.id
                    );
                    None
                }
            };
        }
        if target.rank.is_some_and(|rank| rank.is_privileged()) {
            return Err(ModerationError::ProtectedTarget);
        }
        Ok(target)
    }

    pub async fn issue_warning(
        &self,
        chat_id: ChatId,
        subject: UserId,
        reason: String,
        actor: UserId,
    ) -> Result<WarningOutcome, ModerationError> {
        self.with_ledger_lock((chat_id, subject), async {
            self.store
                .insert_warning(Warning {
                    chat_id,
                    user_id: subject,
                    reason,
                    issued_by: actor,
                    created_at: Utc::now(),
                })
                .await?;
            let count = self.store.count_warnings(chat_id, subject).await?;
            log::info!("Warned {subject} in {chat_id}, now {count}/{WARNING_THRESHOLD}");

            let escalation = if count == WARNING_THRESHOLD {
                Some(self.escalate(chat_id, subject).await?)
            } else {
                None
            };
            Ok::<_, ModerationError>(WarningOutcome { count, escalation })
        })
        .await
    }

    async fn escalate(
        &self,
        chat_id: ChatId,
        subject: UserId,
    ) -> Result<Escalation, ModerationError> {
        match self.policy {
            EscalationPolicy::Recommend => Ok(Escalation::Recommended),
            EscalationPolicy::AutoBan => {
                if let Err(err) = self.gateway.ban_member(chat_id, subject).await {
                    log::warn!("Failed to auto-ban {subject} in {chat_id}: {err:?}");
                    return Ok(Escalation::Recommended);
                }
                let cleared = self.store.clear_warnings(chat_id, subject).await?;
                log::info!("Auto-banned {subject} in {chat_id}, cleared {cleared} warnings");
                Ok(Escalation::Banned)
            }
        }
    }

    /// Returns the number of warnings left.
    pub async fn revoke_last_warning(
        &self,
        chat_id: ChatId,
        subject: UserId,
    ) -> Result<usize, ModerationError> {
        self.with_ledger_lock((chat_id, subject), async {
            let Some(revoked) = self.store.delete_latest_warning(chat_id, subject).await? else {
                return Err(ModerationError::NoWarningsToRevoke);
            };
            let remaining = self.store.count_warnings(chat_id, subject).await?;
            log::info!(
                "Revoked warning from {} for {subject} in {chat_id}, {remaining} left",
                revoked.created_at
            );
            Ok(remaining)
        })
        .await
    }

    /// Returns the number of cleared warnings.
    pub async fn clear_warnings(
        &self,
        chat_id: ChatId,
        subject: UserId,
    ) -> Result<usize, ModerationError> {
        self.with_ledger_lock((chat_id, subject), async {
            Ok::<_, ModerationError>(self.store.clear_warnings(chat_id, subject).await?)
        })
        .await
    }

    pub async fn warnings(
        &self,
        chat_id: ChatId,
        subject: UserId,
    ) -> Result<Vec<Warning>, ModerationError> {
        Ok(self.store.get_warnings(chat_id, subject).await?)
    }

    /// Bans the subject and clears their warnings. Returns the number of
    /// cleared warnings.
    pub async fn execute_ban(
        &self,
        chat_id: ChatId,
        subject: UserId,
    ) -> Result<usize, ModerationError> {
        self.with_ledger_lock((chat_id, subject), async {
            self.gateway
                .ban_member(chat_id, subject)
                .await
                .map_err(ModerationError::Transport)?;
            let cleared = self.store.clear_warnings(chat_id, subject).await?;
            log::info!("Banned {subject} in {chat_id}, cleared {cleared} warnings");
            Ok::<_, ModerationError>(cleared)
        })
        .await
    }

    /// Returns when the restriction ends.
    pub async fn execute_mute(
        &self,
        chat_id: ChatId,
        subject: UserId,
        minutes: u64,
    ) -> Result<DateTime<Utc>, ModerationError> {
        let until = Utc::now() + chrono::Duration::minutes(minutes as i64);
        self.gateway
            .restrict_member(chat_id, subject, until)
            .await
            .map_err(ModerationError::Transport)?;
        log::info!("Muted {subject} in {chat_id} for {minutes} minutes");
        Ok(until)
    }

    pub async fn execute_unmute(
        &self,
        chat_id: ChatId,
        subject: UserId,
    ) -> Result<(), ModerationError> {
        self.gateway
            .lift_restrictions(chat_id, subject)
            .await
            .map_err(ModerationError::Transport)?;
        log::info!("Unmuted {subject} in {chat_id}");
        Ok(())
    }

    async fn with_ledger_lock<T>(&self, key: LedgerKey, operation: impl Future<Output = T>) -> T {
        let lock = Arc::clone(self.ledger_locks.entry(key).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            operation.await
        };
        drop(lock);
        self.ledger_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }
}

/// Minutes to restrict for. Bare integers are minutes; `m`/`h`/`d` suffixes
/// and compounds like `1h30m` are accepted. Anything unparsable or zero
/// becomes [`DEFAULT_RESTRICTION_MINUTES`], and the result never exceeds
/// [`MAX_RESTRICTION_MINUTES`].
pub fn parse_restriction_duration(token: &str) -> u64 {
    let token = token.trim();
    let minutes = if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        // Only overflow can fail here
        token.parse::<u64>().unwrap_or(u64::MAX)
    } else {
        parse_duration(token).map_or(0, |duration| duration.as_secs() / 60)
    };
    if minutes == 0 {
        DEFAULT_RESTRICTION_MINUTES
    } else {
        minutes.min(MAX_RESTRICTION_MINUTES)
    }
}

/// Splits mute arguments into an optional leading duration token and the
/// reason.
pub fn split_duration(args: &str) -> (Option<&str>, &str) {
    let args = args.trim();
    let (token, rest) = match args.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim()),
        None => (args, ""),
    };
    let is_duration = !token.is_empty()
        && (token.bytes().all(|b| b.is_ascii_digit()) || parse_duration(token).is_some());
    if is_duration {
        (Some(token), rest)
    } else {
        (None, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_duration_table() {
        assert_eq!(parse_restriction_duration("10"), 10);
        assert_eq!(parse_restriction_duration("2h"), 120);
        assert_eq!(parse_restriction_duration("3d"), 4320);
        assert_eq!(parse_restriction_duration("0"), DEFAULT_RESTRICTION_MINUTES);
        assert_eq!(parse_restriction_duration("abc"), DEFAULT_RESTRICTION_MINUTES);
        assert_eq!(parse_restriction_duration("99999d"), MAX_RESTRICTION_MINUTES);
    }

    #[test]
    fn restriction_duration_accepts_compounds_and_seconds() {
        assert_eq!(parse_restriction_duration("1h30m"), 90);
        assert_eq!(parse_restriction_duration("90s"), 1);
        assert_eq!(parse_restriction_duration("30s"), DEFAULT_RESTRICTION_MINUTES);
        assert_eq!(parse_restriction_duration(""), DEFAULT_RESTRICTION_MINUTES);
        assert_eq!(
            parse_restriction_duration("99999999999999999999999"),
            MAX_RESTRICTION_MINUTES
        );
    }

    #[test]
    fn splits_leading_duration_from_reason() {
        assert_eq!(split_duration("2h flood"), (Some("2h"), "flood"));
        assert_eq!(split_duration("15"), (Some("15"), ""));
        assert_eq!(split_duration("flood in chat"), (None, "flood in chat"));
        assert_eq!(split_duration(""), (None, ""));
    }

    #[test]
    fn escalation_policy_from_config() {
        assert_eq!(
            "ban".parse::<EscalationPolicy>().unwrap(),
            EscalationPolicy::AutoBan
        );
        assert_eq!(
            " Recommend ".parse::<EscalationPolicy>().unwrap(),
            EscalationPolicy::Recommend
        );
        assert!("kick".parse::<EscalationPolicy>().is_err());
    }
}
