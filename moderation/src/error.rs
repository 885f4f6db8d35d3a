use modbot_common::bot_commands::TicketId;

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("You need to be an administrator to do this")]
    InsufficientPrivilege,
    #[error("Administrators can't be targeted")]
    ProtectedTarget,
    #[error("You can't target yourself")]
    SelfTargetForbidden,
    #[error("Bots can't be targeted")]
    BotTargetForbidden,
    #[error("User not found. Reply to their message, or pass an @username or a numeric ID")]
    TargetNotFound,
    #[error("This user has no warnings")]
    NoWarningsToRevoke,
    #[error("Telegram refused the action")]
    Transport(anyhow::Error),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ModerationError {
    /// Rejections the actor should see, as opposed to infrastructure failures
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            ModerationError::Transport(_) | ModerationError::Storage(_)
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("Ticket #{0} not found")]
    NotFound(TicketId),
    #[error("Ticket #{0} has already been handled")]
    AlreadyTerminal(TicketId),
    #[error("The ticket text can't be empty")]
    EmptyBody,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
