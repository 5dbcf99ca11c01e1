//! Message model.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ChatId;

/// Text shown for messages that carry no extractable text.
pub const ATTACHMENT_PLACEHOLDER: &str = "[Attachment]";

/// Store-assigned message identifier (`message.ROWID`), monotonically increasing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Store id.
    pub id: MessageId,
    /// Owning conversation.
    pub chat_id: ChatId,
    /// External identifier of the owning conversation.
    pub chat_identifier: String,
    /// Display name of the owning conversation.
    pub chat_name: String,
    /// Resolved sender name (`Me` for outgoing messages).
    pub sender: String,
    /// When the message was sent.
    pub date: Option<DateTime<Utc>>,
    /// Plain text after extraction.
    pub text: String,
    /// Whether the local user sent this message.
    pub is_from_me: bool,
    /// Whether the message has been read.
    pub is_read: bool,
    /// Service the message went through.
    pub service: String,
}

impl Message {
    /// Creates an incoming message.
    #[must_use]
    pub fn new(id: MessageId, chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            id,
            chat_id,
            chat_identifier: String::new(),
            chat_name: String::new(),
            sender: "Unknown".to_string(),
            date: None,
            text: text.into(),
            is_from_me: false,
            is_read: false,
            service: "iMessage".to_string(),
        }
    }

    /// Sets the sender name.
    #[must_use]
    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    /// Marks the message as sent by the local user.
    #[must_use]
    pub fn from_me(mut self) -> Self {
        self.is_from_me = true;
        self.is_read = true;
        self.sender = "Me".to_string();
        self
    }

    /// Sets the message date.
    #[must_use]
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }
}
