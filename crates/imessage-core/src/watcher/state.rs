//! Watermarks kept by the poll loop.

use tracing::{debug, trace};

use crate::Result;
use crate::model::{Conversation, Message, MessageId};
use crate::store::{MessageStore, StoreVersion};

/// What one poll iteration found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// First successful read; watermarks set, nothing dispatched.
    Seeded {
        /// Highest message id at seeding time.
        last_seen: MessageId,
    },
    /// The store has not been modified since the last tick.
    Unchanged,
    /// The store was modified.
    Changed {
        /// Messages newer than the previous watermark, ascending by id.
        messages: Vec<Message>,
        /// The full, freshly read conversation list.
        conversations: Vec<Conversation>,
    },
}

/// Where the poll loop has read up to.
///
/// `last_seen_message_id` never decreases. Both watermarks are committed
/// together at the end of a tick, so a failed tick leaves them untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherState {
    last_seen_message_id: MessageId,
    last_seen_store_version: StoreVersion,
    seeded: bool,
}

impl WatcherState {
    /// Unseeded state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest message id already reported.
    #[must_use]
    pub const fn last_seen_message_id(&self) -> MessageId {
        self.last_seen_message_id
    }

    /// Store version at the last successful tick.
    #[must_use]
    pub const fn last_seen_store_version(&self) -> StoreVersion {
        self.last_seen_store_version
    }

    /// Reads both watermarks from the store without reporting anything.
    ///
    /// # Errors
    ///
    /// Returns the store error; the state is left unchanged.
    pub async fn seed<S: MessageStore>(&mut self, store: &S) -> Result<MessageId> {
        let version = store.version().await?;
        let max_id = store.max_message_id().await?;
        self.last_seen_store_version = version;
        self.last_seen_message_id = self.last_seen_message_id.max(max_id);
        self.seeded = true;
        debug!(last_seen = %self.last_seen_message_id, "Watcher seeded");
        Ok(self.last_seen_message_id)
    }

    /// Runs one poll iteration.
    ///
    /// An unseeded state seeds instead of reporting, so history is never
    /// replayed as new messages.
    ///
    /// # Errors
    ///
    /// Returns the first store error; the state is left unchanged.
    pub async fn tick<S: MessageStore>(
        &mut self,
        store: &S,
        conversation_limit: u32,
    ) -> Result<TickOutcome> {
        if !self.seeded {
            let last_seen = self.seed(store).await?;
            return Ok(TickOutcome::Seeded { last_seen });
        }

        let version = store.version().await?;
        if version == self.last_seen_store_version {
            trace!("Store unchanged");
            return Ok(TickOutcome::Unchanged);
        }

        let max_id = store.max_message_id().await?;
        let messages = if max_id > self.last_seen_message_id {
            store.new_messages(self.last_seen_message_id).await?
        } else {
            Vec::new()
        };
        let conversations = store.conversations(conversation_limit).await?;

        let batch_max = messages.iter().map(|msg| msg.id).max().unwrap_or_default();
        self.last_seen_message_id = self.last_seen_message_id.max(max_id).max(batch_max);
        self.last_seen_store_version = version;

        debug!(
            new_messages = messages.len(),
            conversations = conversations.len(),
            last_seen = %self.last_seen_message_id,
            "Store changed"
        );
        Ok(TickOutcome::Changed {
            messages,
            conversations,
        })
    }
}
