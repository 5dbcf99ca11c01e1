//! Domain models for conversations and messages.
//!
//! Values are immutable snapshots produced by store queries. A refresh
//! replaces them wholesale; nothing mutates them in place.

mod conversation;
pub mod format;
mod message;
pub mod time;

pub use conversation::{ChatId, ChatRef, Conversation};
pub use message::{ATTACHMENT_PLACEHOLDER, Message, MessageId};
