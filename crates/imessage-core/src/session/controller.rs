//! Mediates between the change detector, user commands and the renderer.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::state::{InFlightGuard, SessionState};
use super::update::{RenderUpdate, Status, UpdateSender};
use crate::model::{ChatId, ChatRef, Conversation, Message};
use crate::sender::{DEFAULT_SEND_TIMEOUT, MessageSender};
use crate::store::MessageStore;
use crate::watcher::{ChangeDetector, DEFAULT_CONVERSATION_LIMIT};
use crate::{Error, Result};

/// Limits and bounds for session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Conversations fetched per load.
    pub conversation_limit: u32,
    /// Messages fetched per conversation.
    pub message_limit: u32,
    /// Bound on a single conversation's message load.
    pub load_timeout: Duration,
    /// Bound on each fetch made by a refresh.
    pub refresh_timeout: Duration,
    /// Bound on a send.
    pub send_timeout: Duration,
    /// Pause after a successful send before reloading messages.
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conversation_limit: DEFAULT_CONVERSATION_LIMIT,
            message_limit: 100,
            load_timeout: Duration::from_secs(5),
            refresh_timeout: Duration::from_secs(5),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            settle_delay: Duration::from_millis(500),
        }
    }
}

struct Shared<S, M> {
    store: Arc<S>,
    sender: Arc<M>,
    config: SessionConfig,
    state: RwLock<SessionState>,
    send_in_flight: Arc<AtomicBool>,
    refresh_in_flight: Arc<AtomicBool>,
    loads: AtomicU64,
    updates: UpdateSender,
}

/// Owns the live session state.
///
/// Every method may be called from any task. State changes that should be
/// visible are also queued as [`RenderUpdate`]s; the renderer never reads
/// from a background task directly. Clones share the same session.
pub struct SessionController<S, M> {
    shared: Arc<Shared<S, M>>,
}

impl<S, M> Clone for SessionController<S, M> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, M> fmt::Debug for SessionController<S, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl<S: MessageStore, M: MessageSender> SessionController<S, M> {
    /// Creates a session with nothing loaded.
    #[must_use]
    pub fn new(store: Arc<S>, sender: Arc<M>, config: SessionConfig, updates: UpdateSender) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                sender,
                config,
                state: RwLock::new(SessionState::default()),
                send_in_flight: Arc::new(AtomicBool::new(false)),
                refresh_in_flight: Arc::new(AtomicBool::new(false)),
                loads: AtomicU64::new(0),
                updates,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Ticket for a message load. Later loads get larger tickets.
    fn next_load(&self) -> u64 {
        self.shared.loads.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// A copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.read().clone()
    }

    /// The selected conversation id.
    #[must_use]
    pub fn selected(&self) -> Option<ChatId> {
        self.read().selected
    }

    /// Loads the conversation list, selects the first conversation and
    /// loads its messages.
    ///
    /// # Errors
    ///
    /// Returns the store error or timeout. The state keeps whatever had been
    /// loaded before the failure.
    pub async fn load_initial(&self) -> Result<()> {
        let config = &self.shared.config;
        let conversations = bounded(
            config.refresh_timeout,
            "conversation load",
            self.shared.store.conversations(config.conversation_limit),
        )
        .await?;

        let first = {
            let mut state = self.write();
            state.conversations.clone_from(&conversations);
            if state.selected.is_none() {
                state.selected = conversations.first().map(|conv| conv.id);
                state.selected
            } else {
                None
            }
        };
        info!(count = conversations.len(), "Initial conversations loaded");
        self.shared
            .updates
            .push(RenderUpdate::Conversations(conversations));

        if let Some(chat_id) = first {
            self.shared
                .updates
                .push(RenderUpdate::MessagesLoading { chat_id });
            let ticket = self.next_load();
            let messages = bounded(
                config.load_timeout,
                "message load",
                self.shared
                    .store
                    .messages(&ChatRef::Id(chat_id), config.message_limit),
            )
            .await?;
            self.commit_messages(chat_id, ticket, messages);
        }
        Ok(())
    }

    /// Registers this session's handlers with `detector`.
    pub fn attach<D: MessageStore>(&self, detector: &ChangeDetector<D>) {
        let session = self.clone();
        detector.register_message_handler(move |batch| {
            let session = session.clone();
            async move { session.on_new_messages(batch).await }
        });

        let session = self.clone();
        detector.register_conversation_handler(move |conversations| {
            session.on_conversations_updated(conversations);
            std::future::ready(Ok(()))
        });

        let updates = self.shared.updates.clone();
        detector.register_error_handler(move |err| {
            updates.status(Status::from_error(&err));
            std::future::ready(Ok(()))
        });
    }

    /// Selects a conversation and loads its messages in the background.
    ///
    /// The loaded messages are only kept if `chat_id` is still selected
    /// when they arrive and no later load has been kept in the meantime.
    pub fn select_conversation(&self, chat_id: ChatId) -> JoinHandle<()> {
        let ticket = self.next_load();
        {
            let mut state = self.write();
            if state.selected != Some(chat_id) {
                state.messages.clear();
            }
            state.selected = Some(chat_id);
        }
        debug!(%chat_id, "Conversation selected");
        self.shared
            .updates
            .push(RenderUpdate::MessagesLoading { chat_id });

        let session = self.clone();
        tokio::spawn(async move { session.load_messages(chat_id, ticket).await })
    }

    /// Sends `text` to the selected conversation in the background.
    ///
    /// On failure or timeout the text is queued back for the input line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] while another send is in flight and
    /// [`Error::NoSelection`] when no conversation is selected. Nothing is
    /// sent in either case.
    pub fn send_message(&self, text: String) -> Result<JoinHandle<()>> {
        let guard = InFlightGuard::acquire(&self.shared.send_in_flight).ok_or(Error::Busy)?;
        let recipient = self
            .read()
            .selected_conversation()
            .map(|conv| conv.identifier.clone())
            .ok_or(Error::NoSelection)?;

        let session = self.clone();
        Ok(tokio::spawn(async move {
            let _guard = guard;
            session.deliver(&recipient, text).await;
        }))
    }

    async fn deliver(&self, recipient: &str, text: String) {
        let config = &self.shared.config;
        let updates = &self.shared.updates;
        updates.status(Status::Sending);

        let sent = bounded(
            config.send_timeout,
            "send",
            self.shared.sender.send(recipient, &text),
        )
        .await;

        match sent {
            Ok(()) => {
                info!(recipient, "Message sent");
                updates.status(Status::Sent);
                tokio::time::sleep(config.settle_delay).await;
                if let Some(chat_id) = self.selected() {
                    self.load_messages(chat_id, self.next_load()).await;
                }
            }
            Err(err) => {
                warn!(recipient, error = %err, "Send failed");
                updates.push(RenderUpdate::RestoreInput(text));
                updates.status(Status::from_error(&err));
            }
        }
    }

    /// Reloads conversations and the selected conversation's messages in
    /// the background. Returns `None` if a refresh is already running.
    ///
    /// A refresh that fails or times out leaves the state untouched.
    pub fn refresh(&self) -> Option<JoinHandle<()>> {
        let Some(guard) = InFlightGuard::acquire(&self.shared.refresh_in_flight) else {
            debug!("Refresh already in flight");
            return None;
        };
        let session = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = session.run_refresh().await {
                warn!(error = %err, "Refresh failed");
                session.shared.updates.status(Status::from_error(&err));
            }
        }))
    }

    async fn run_refresh(&self) -> Result<()> {
        let config = &self.shared.config;
        let store = &self.shared.store;
        self.shared.updates.status(Status::Refreshing);

        let selected = self.selected();
        let ticket = self.next_load();
        let conversations = bounded(
            config.refresh_timeout,
            "refresh",
            store.conversations(config.conversation_limit),
        )
        .await?;
        let messages = match selected {
            Some(chat_id) => Some(
                bounded(
                    config.refresh_timeout,
                    "refresh",
                    store.messages(&ChatRef::Id(chat_id), config.message_limit),
                )
                .await?,
            ),
            None => None,
        };

        let messages_kept = {
            let mut state = self.write();
            state.conversations.clone_from(&conversations);
            match (&messages, selected) {
                (Some(messages), Some(chat_id)) => {
                    state.accept_messages(chat_id, ticket, messages)
                }
                _ => false,
            }
        };

        self.shared
            .updates
            .push(RenderUpdate::Conversations(conversations));
        if let (true, Some(messages), Some(chat_id)) = (messages_kept, messages, selected) {
            self.shared
                .updates
                .push(RenderUpdate::Messages { chat_id, messages });
        }
        self.shared.updates.status(Status::Refreshed);
        Ok(())
    }

    /// Handles a batch of new messages from the detector.
    ///
    /// # Errors
    ///
    /// Never fails; load problems are reported as status.
    pub async fn on_new_messages(&self, batch: Vec<Message>) -> Result<()> {
        if let Some(latest) = batch.iter().rev().find(|msg| !msg.is_from_me) {
            self.shared.updates.status(Status::NewMessage {
                from: latest.sender.clone(),
            });
        }
        if let Some(chat_id) = self.selected()
            && batch.iter().any(|msg| msg.chat_id == chat_id)
        {
            self.load_messages(chat_id, self.next_load()).await;
        }
        Ok(())
    }

    /// Replaces the conversation list. Selects the first conversation when
    /// nothing is selected yet.
    pub fn on_conversations_updated(
        &self,
        conversations: Vec<Conversation>,
    ) -> Option<JoinHandle<()>> {
        let first = {
            let mut state = self.write();
            state.conversations.clone_from(&conversations);
            if state.selected.is_none() {
                conversations.first().map(|conv| conv.id)
            } else {
                None
            }
        };
        self.shared
            .updates
            .push(RenderUpdate::Conversations(conversations));
        first.map(|chat_id| self.select_conversation(chat_id))
    }

    async fn load_messages(&self, chat_id: ChatId, ticket: u64) {
        let config = &self.shared.config;
        let loaded = bounded(
            config.load_timeout,
            "message load",
            self.shared
                .store
                .messages(&ChatRef::Id(chat_id), config.message_limit),
        )
        .await;
        match loaded {
            Ok(messages) => self.commit_messages(chat_id, ticket, messages),
            Err(err) => {
                warn!(%chat_id, error = %err, "Message load failed");
                self.shared.updates.status(Status::from_error(&err));
            }
        }
    }

    /// Keeps `messages` if `chat_id` is still selected and no later load
    /// has been kept.
    fn commit_messages(&self, chat_id: ChatId, ticket: u64, messages: Vec<Message>) {
        if !self.write().accept_messages(chat_id, ticket, &messages) {
            debug!(%chat_id, ticket, "Discarding stale message load");
            return;
        }
        self.shared
            .updates
            .push(RenderUpdate::Messages { chat_id, messages });
    }
}

/// Runs `fut` with a time limit, reporting an elapsed limit as [`Error::Timeout`].
async fn bounded<T>(
    after: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| Error::Timeout { operation, after })?
}
