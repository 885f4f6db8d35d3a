//! Reply keyboards shown in private chats.

use modbot_common::gateway::Keyboard;

use crate::store::TicketType;

pub const MY_ID: &str = "🆔 My ID";
pub const SUPPORT: &str = "🆘 Support";
pub const HELP: &str = "ℹ️ Help";
pub const APPEAL: &str = "📝 Appeal a punishment";
pub const COMPLAINT: &str = "⚠️ Report a user";
pub const SUGGESTION: &str = "💡 Suggest an improvement";
pub const BACK: &str = "🔙 Back";

pub fn main_menu() -> Keyboard {
    Keyboard::Menu(vec![
        vec![MY_ID.to_string()],
        vec![SUPPORT.to_string()],
        vec![HELP.to_string()],
    ])
}

pub fn support_menu() -> Keyboard {
    Keyboard::Menu(vec![
        vec![APPEAL.to_string()],
        vec![COMPLAINT.to_string()],
        vec![SUGGESTION.to_string()],
        vec![BACK.to_string()],
    ])
}

/// The ticket type a support menu button stands for
pub fn ticket_type_for(label: &str) -> Option<TicketType> {
    match label {
        APPEAL => Some(TicketType::Appeal),
        COMPLAINT => Some(TicketType::Complaint),
        SUGGESTION => Some(TicketType::Suggestion),
        _ => None,
    }
}
