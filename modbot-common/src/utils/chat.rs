use teloxide::types::{ChatMember, User};

use crate::gateway::{ChatMemberInfo, ChatUser, MemberRank};

impl From<&User> for ChatUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_bot: user.is_bot,
        }
    }
}

impl From<&ChatMember> for ChatMemberInfo {
    fn from(member: &ChatMember) -> Self {
        let rank = if member.is_owner() {
            MemberRank::Owner
        } else if member.is_administrator() {
            MemberRank::Administrator
        } else {
            MemberRank::Member
        };
        Self {
            user: ChatUser::from(&member.user),
            rank,
        }
    }
}
