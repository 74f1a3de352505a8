//! Inbound message type, decoupled from teloxide.

use regex::Regex;

/// Username used when the sender has none.
pub const ANONYMOUS_USERNAME: &str = "user";

/// A text message delivered to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub message_id: i64,
    /// Chat ID where this message was sent (negative = group, positive = DM).
    pub chat_id: i64,
    /// One-to-one chat with the bot.
    pub is_private: bool,
    /// Sender's Telegram username, if set.
    pub username: Option<String>,
    pub text: String,
}

impl IncomingMessage {
    /// Sender name used in prompts.
    pub fn display_username(&self) -> &str {
        self.username.as_deref().filter(|u| !u.is_empty()).unwrap_or(ANONYMOUS_USERNAME)
    }
}

/// Whether the text mentions the bot. Telegram usernames are case-insensitive.
pub fn contains_mention(text: &str, bot_username: &str) -> bool {
    text.to_ascii_lowercase()
        .contains(&format!("@{}", bot_username.to_ascii_lowercase()))
}

/// Remove every `@bot` mention (with its trailing space, if any), ignoring case.
pub fn strip_mention(text: &str, bot_username: &str) -> String {
    let pattern = format!("(?i)@{} ?", regex::escape(bot_username));
    match Regex::new(&pattern) {
        Ok(re) => re.replace_all(text, "").into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Escape `#` so user text cannot forge the `###` turn delimiters.
pub fn escape_delimiters(text: &str) -> String {
    text.replace('#', "\\#")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_username() {
        let mut msg = IncomingMessage {
            message_id: 1,
            chat_id: 1,
            is_private: true,
            username: Some("alice".to_string()),
            text: "hi".to_string(),
        };
        assert_eq!(msg.display_username(), "alice");
        msg.username = None;
        assert_eq!(msg.display_username(), "user");
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("@relay_bot what's up?", "relay_bot"), "what's up?");
        assert_eq!(strip_mention("hey @relay_bot", "relay_bot"), "hey ");
        assert_eq!(strip_mention("@relay_bot a @relay_bot b", "relay_bot"), "a b");
    }

    #[test]
    fn test_mention_ignores_case() {
        assert!(contains_mention("hey @Relay_Bot", "relay_bot"));
        assert!(contains_mention("@relay_bot", "Relay_Bot"));
        assert!(!contains_mention("hey @other_bot", "relay_bot"));
        assert!(!contains_mention("relay_bot without at", "relay_bot"));
        assert_eq!(strip_mention("@RELAY_BOT hi @Relay_Bot", "relay_bot"), "hi ");
    }

    #[test]
    fn test_escape_delimiters() {
        assert_eq!(escape_delimiters("a ### b #"), "a \\#\\#\\# b \\#");
    }
}
