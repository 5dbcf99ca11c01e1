//! Conversation model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned conversation identifier (`chat.ROWID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A way of naming a conversation when querying messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatRef {
    /// By store id.
    Id(ChatId),
    /// By external identifier (phone number, email, or group identifier).
    Identifier(String),
}

impl From<ChatId> for ChatRef {
    fn from(id: ChatId) -> Self {
        Self::Id(id)
    }
}

/// A thread of messages with one or more participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Store id.
    pub id: ChatId,
    /// External identifier (`chat.chat_identifier`), used as the send target.
    pub identifier: String,
    /// Display name: group name, resolved contact name, or the identifier.
    pub display_name: String,
    /// Service name (`iMessage`, `SMS`).
    pub service: String,
    /// Date of the most recent message.
    pub last_message_date: Option<DateTime<Utc>>,
    /// Text of the most recent message.
    pub last_message_text: String,
    /// Incoming messages not yet read.
    pub unread_count: u32,
    /// Participant handles.
    pub participants: Vec<String>,
}

impl Conversation {
    /// Creates a conversation with no messages.
    #[must_use]
    pub fn new(id: ChatId, identifier: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            identifier: identifier.into(),
            display_name: display_name.into(),
            service: "iMessage".to_string(),
            last_message_date: None,
            last_message_text: String::new(),
            unread_count: 0,
            participants: Vec::new(),
        }
    }

    /// Sets the last message date.
    #[must_use]
    pub fn with_last_message_date(mut self, date: DateTime<Utc>) -> Self {
        self.last_message_date = Some(date);
        self
    }

    /// Sets the unread count.
    #[must_use]
    pub fn with_unread(mut self, unread_count: u32) -> Self {
        self.unread_count = unread_count;
        self
    }

    /// Name to show for this conversation.
    #[must_use]
    pub fn title(&self) -> &str {
        if self.display_name.is_empty() {
            &self.identifier
        } else {
            &self.display_name
        }
    }

    /// Whether this is a group conversation.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.participants.len() > 1
    }

    /// Whether the service is SMS rather than iMessage.
    #[must_use]
    pub fn is_sms(&self) -> bool {
        self.service.contains("SMS")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_falls_back_to_identifier() {
        let conv = Conversation::new(ChatId(1), "+15551234567", "");
        assert_eq!(conv.title(), "+15551234567");

        let conv = Conversation::new(ChatId(1), "+15551234567", "Alice");
        assert_eq!(conv.title(), "Alice");
    }

    #[test]
    fn test_is_group() {
        let mut conv = Conversation::new(ChatId(7), "chat123", "Family");
        conv.participants = vec!["+15550001".into()];
        assert!(!conv.is_group());
        conv.participants.push("+15550002".into());
        assert!(conv.is_group());
    }
}
