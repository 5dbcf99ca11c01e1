//! Read access to the external message store.
//!
//! The store is owned by another application. It is opened per operation
//! and never written to.

mod attributed_body;
mod chat_db;
pub mod memory;

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

pub use attributed_body::extract_text;
pub use chat_db::ChatDb;
pub use memory::MemoryStore;

use crate::Result;
use crate::model::{ChatRef, Conversation, Message, MessageId};

/// Opaque marker of the store's last modification.
///
/// Derived from file modification times, so it only grows while the store
/// is being written. Zero means no file could be inspected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreVersion(u128);

impl StoreVersion {
    /// Creates a version from a raw counter.
    #[must_use]
    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Creates a version from a file modification time.
    #[must_use]
    pub fn from_mtime(mtime: SystemTime) -> Self {
        Self(
            mtime
                .duration_since(UNIX_EPOCH)
                .map_or(0, |elapsed| elapsed.as_nanos()),
        )
    }
}

/// Queries the change detector and session need from a message store.
///
/// Every method opens whatever connection it needs and releases it before
/// returning; nothing is held between calls.
pub trait MessageStore: Send + Sync + 'static {
    /// Conversations ordered most-recent-first.
    fn conversations(&self, limit: u32) -> impl Future<Output = Result<Vec<Conversation>>> + Send;

    /// The most recent `limit` messages of a conversation, oldest-first.
    fn messages(
        &self,
        chat: &ChatRef,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Message>>> + Send;

    /// Every message with an id strictly greater than `since`, ascending by id.
    fn new_messages(&self, since: MessageId)
    -> impl Future<Output = Result<Vec<Message>>> + Send;

    /// Number of unread incoming messages.
    fn unread_count(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Highest message id in the store, zero when empty.
    fn max_message_id(&self) -> impl Future<Output = Result<MessageId>> + Send;

    /// Current modification signal.
    fn version(&self) -> impl Future<Output = Result<StoreVersion>> + Send;
}
