pub mod chat;

use std::time::Duration;

use teloxide::utils::markdown;

use crate::gateway::ChatUser;

pub fn format_duration(duration: Duration) -> String {
    let mut duration = duration;
    let mut result = String::new();
    let mut components = 0;
    const MAX_COMPONENTS: usize = 2;
    if duration.as_secs() >= 86400 && components < MAX_COMPONENTS {
        result.push_str(&format!("{}d ", duration.as_secs() / 86400));
        duration = Duration::from_secs(duration.as_secs() % 86400);
        components += 1;
    }
    if duration.as_secs() >= 3600 && components < MAX_COMPONENTS {
        result.push_str(&format!("{}h ", duration.as_secs() / 3600));
        duration = Duration::from_secs(duration.as_secs() % 3600);
        components += 1;
    }
    if duration.as_secs() >= 60 && components < MAX_COMPONENTS {
        result.push_str(&format!("{}m ", duration.as_secs() / 60));
        duration = Duration::from_secs(duration.as_secs() % 60);
        components += 1;
    }
    if duration.as_secs() > 0 && components < MAX_COMPONENTS {
        result.push_str(&format!("{}s", duration.as_secs()));
        components += 1;
    }
    if components == 0 {
        result.push_str("less than a second");
    }
    result.trim_end().to_string()
}

/// Parses compound duration tokens like `1d`, `2h30m` or `90s`. A trailing
/// number without a unit is rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut total = Duration::default();
    let mut number = String::new();

    for ch in input.chars() {
        if ch.is_ascii_digit() {
            number.push(ch);
        } else {
            let value: u64 = number.parse().ok()?;
            number.clear();
            let unit_secs = match ch.to_ascii_lowercase() {
                'd' => 24 * 60 * 60,
                'h' => 60 * 60,
                'm' => 60,
                's' => 1,
                _ => return None,
            };
            total = total.saturating_add(Duration::from_secs(value.saturating_mul(unit_secs)));
        }
    }

    if !number.is_empty() {
        return None;
    }

    Some(total)
}

/// `@handle` if the user has one, otherwise their id in monospace. MarkdownV2.
pub fn user_mention(user: &ChatUser) -> String {
    match &user.username {
        Some(username) => markdown::escape(&format!("@{username}")),
        None => markdown::code_inline(&user.id.to_string()),
    }
}
