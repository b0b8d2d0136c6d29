//! Helpers for presenting the chat list

use super::types::{ChatMode, ChatSummary};
use chrono::{DateTime, Utc};

/// Case-insensitive title filter. An empty query keeps everything.
pub fn filter_by_title<'a>(chats: &'a [ChatSummary], query: &str) -> Vec<&'a ChatSummary> {
    let needle = query.trim().to_lowercase();
    chats
        .iter()
        .filter(|chat| needle.is_empty() || chat.title.to_lowercase().contains(&needle))
        .collect()
}

/// Group chats by mode, in the fixed mode order, skipping empty groups
pub fn group_by_mode<'a>(chats: &[&'a ChatSummary]) -> Vec<(ChatMode, Vec<&'a ChatSummary>)> {
    ChatMode::ALL
        .iter()
        .filter_map(|mode| {
            let group: Vec<_> = chats.iter().copied().filter(|c| c.mode == *mode).collect();
            (!group.is_empty()).then_some((*mode, group))
        })
        .collect()
}

/// Relative label for when a chat was last touched
pub fn day_label(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let days = (now.date_naive() - timestamp.date_naive()).num_days();
    match days {
        d if d <= 0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        d if d < 7 => format!("{} days ago", d),
        _ => timestamp.format("%b %-d, %Y").to_string(),
    }
}
