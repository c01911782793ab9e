pub mod file_repository;
pub mod repository;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// History index entry for one conversation. The transcript itself lives in
/// the backend thread; this record is what the dashboard lists and what maps
/// a conversation back to its `thread_id` for follow-up turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: String,
    pub agent_id: String,
    pub thread_id: String,
    /// First ~80 chars of the opening user message.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Truncate a string to ~80 chars for use as a title, breaking at a word
/// boundary.
pub fn make_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= 80 {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(80).collect();
    let boundary = truncated.rfind(' ').unwrap_or(truncated.len());
    format!("{}...", &truncated[..boundary])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_title_short_text_unchanged() {
        assert_eq!(make_title("  hello there  "), "hello there");
    }

    #[test]
    fn test_make_title_truncates_at_word_boundary() {
        let long = "word ".repeat(40);
        let title = make_title(&long);
        assert!(title.ends_with("..."));
        assert!(title.chars().count() <= 83);
        assert!(!title.trim_end_matches("...").ends_with("wor"));
    }
}
