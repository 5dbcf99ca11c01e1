//! In-memory message store for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{MessageStore, StoreVersion};
use crate::model::{ChatId, ChatRef, Conversation, Message, MessageId};
use crate::{Error, Result};

/// Failure a [`MemoryStore`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Queries fail with [`Error::StoreBusy`].
    Busy,
    /// Queries fail with [`Error::StoreUnavailable`].
    Unavailable,
}

#[derive(Debug, Default)]
struct Inner {
    conversations: Vec<Conversation>,
    messages: Vec<Message>,
    version: u128,
    failure: Option<Failure>,
    conversation_delay: Duration,
    message_delays: HashMap<ChatId, Duration>,
}

/// A [`MessageStore`] held entirely in memory.
///
/// Every mutation bumps the version, the way a write to the real database
/// bumps its modification time. Failures apply to every query except
/// [`MessageStore::version`], so a poll can observe a change and then fail.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    queries: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given conversations.
    #[must_use]
    pub fn with_conversations(conversations: Vec<Conversation>) -> Self {
        let store = Self::new();
        store.lock().conversations = conversations;
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a message and updates its conversation's summary.
    pub fn push_message(&self, message: Message) {
        let mut inner = self.lock();
        if let Some(conv) = inner
            .conversations
            .iter_mut()
            .find(|conv| conv.id == message.chat_id)
        {
            conv.last_message_date = message.date.or(conv.last_message_date);
            conv.last_message_text.clone_from(&message.text);
            if !message.is_from_me && !message.is_read {
                conv.unread_count += 1;
            }
        }
        inner.messages.push(message);
        inner.version += 1;
    }

    /// Inserts or replaces a conversation by id.
    pub fn upsert_conversation(&self, conversation: Conversation) {
        let mut inner = self.lock();
        match inner
            .conversations
            .iter_mut()
            .find(|conv| conv.id == conversation.id)
        {
            Some(existing) => *existing = conversation,
            None => inner.conversations.push(conversation),
        }
        inner.version += 1;
    }

    /// Bumps the version without changing any data.
    pub fn touch(&self) {
        self.lock().version += 1;
    }

    /// Makes subsequent queries fail, or succeed again with `None`.
    pub fn set_failure(&self, failure: Option<Failure>) {
        self.lock().failure = failure;
    }

    /// Delays every conversation-list query.
    pub fn set_conversation_delay(&self, delay: Duration) {
        self.lock().conversation_delay = delay;
    }

    /// Delays message queries for one conversation.
    pub fn set_message_delay(&self, chat: ChatId, delay: Duration) {
        self.lock().message_delays.insert(chat, delay);
    }

    /// Number of data queries served, not counting version checks.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        match self.lock().failure {
            Some(Failure::Busy) => Err(Error::StoreBusy("database is locked".to_string())),
            Some(Failure::Unavailable) => {
                Err(Error::StoreUnavailable("database not found".to_string()))
            }
            None => Ok(()),
        }
    }

    fn resolve(&self, chat: &ChatRef) -> Option<ChatId> {
        match chat {
            ChatRef::Id(id) => Some(*id),
            ChatRef::Identifier(identifier) => self
                .lock()
                .conversations
                .iter()
                .find(|conv| &conv.identifier == identifier)
                .map(|conv| conv.id),
        }
    }
}

impl MessageStore for MemoryStore {
    async fn conversations(&self, limit: u32) -> Result<Vec<Conversation>> {
        let delay = self.lock().conversation_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check()?;

        let mut conversations = self.lock().conversations.clone();
        conversations.sort_by(|a, b| b.last_message_date.cmp(&a.last_message_date));
        conversations.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(conversations)
    }

    async fn messages(&self, chat: &ChatRef, limit: u32) -> Result<Vec<Message>> {
        let Some(chat_id) = self.resolve(chat) else {
            self.check()?;
            return Ok(Vec::new());
        };
        self.check()?;

        // Read first, then wait: a slow query answers from the data as it
        // was when the query started.
        let (mut messages, delay) = {
            let inner = self.lock();
            let messages: Vec<Message> = inner
                .messages
                .iter()
                .filter(|msg| msg.chat_id == chat_id)
                .cloned()
                .collect();
            let delay = inner
                .message_delays
                .get(&chat_id)
                .copied()
                .unwrap_or_default();
            (messages, delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        messages.sort_by_key(|msg| msg.id);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }

    async fn new_messages(&self, since: MessageId) -> Result<Vec<Message>> {
        self.check()?;
        let mut messages: Vec<Message> = self
            .lock()
            .messages
            .iter()
            .filter(|msg| msg.id > since)
            .cloned()
            .collect();
        messages.sort_by_key(|msg| msg.id);
        Ok(messages)
    }

    async fn unread_count(&self) -> Result<u64> {
        self.check()?;
        let unread = self
            .lock()
            .messages
            .iter()
            .filter(|msg| !msg.is_read && !msg.is_from_me)
            .count();
        Ok(u64::try_from(unread).unwrap_or(u64::MAX))
    }

    async fn max_message_id(&self) -> Result<MessageId> {
        self.check()?;
        Ok(self
            .lock()
            .messages
            .iter()
            .map(|msg| msg.id)
            .max()
            .unwrap_or_default())
    }

    async fn version(&self) -> Result<StoreVersion> {
        Ok(StoreVersion::new(self.lock().version))
    }
}
