//! Background polling of the message store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use super::registry::HandlerRegistry;
use super::state::{TickOutcome, WatcherState};
use crate::model::{Conversation, Message};
use crate::store::MessageStore;
use crate::{Error, Result};

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default number of conversations fetched per change.
pub const DEFAULT_CONVERSATION_LIMIT: u32 = 50;

/// Poll loop settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorConfig {
    /// Time between polls.
    pub poll_interval: Duration,
    /// Conversations fetched after each change.
    pub conversation_limit: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            conversation_limit: DEFAULT_CONVERSATION_LIMIT,
        }
    }
}

struct PollLoop {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Watches the store and reports new messages and conversation changes.
///
/// Idle until [`start`](Self::start), then polls in one background task
/// until [`stop`](Self::stop). Handlers can be registered at any time.
pub struct ChangeDetector<S> {
    store: Arc<S>,
    config: DetectorConfig,
    handlers: Arc<HandlerRegistry>,
    lifecycle: Mutex<Option<PollLoop>>,
}

impl<S: MessageStore> ChangeDetector<S> {
    /// Creates an idle detector.
    #[must_use]
    pub fn new(store: Arc<S>, config: DetectorConfig) -> Self {
        Self {
            store,
            config,
            handlers: Arc::new(HandlerRegistry::new()),
            lifecycle: Mutex::new(None),
        }
    }

    /// Adds a handler for batches of new messages.
    pub fn register_message_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Vec<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers.register_message_handler(handler);
    }

    /// Adds a handler for refreshed conversation lists.
    pub fn register_conversation_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Vec<Conversation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers.register_conversation_handler(handler);
    }

    /// Adds a handler for store failures.
    pub fn register_error_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Arc<Error>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.handlers.register_error_handler(handler);
    }

    /// Seeds the watermarks and starts polling. Does nothing if already running.
    ///
    /// A seeding failure goes to the error handlers; the loop then seeds on
    /// its first successful poll instead of reporting.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            debug!("Change detector already running");
            return;
        }

        let mut state = WatcherState::new();
        if let Err(err) = state.seed(self.store.as_ref()).await {
            warn!(error = %err, "Could not seed watcher; will retry on first poll");
            self.handlers.dispatch_error(err);
        }

        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.store),
            Arc::clone(&self.handlers),
            self.config.clone(),
            state,
            stopped,
        ));
        *lifecycle = Some(PollLoop { stop, task });
        info!(
            interval_ms = self.config.poll_interval.as_millis(),
            "Change detector started"
        );
    }

    /// Stops polling and waits for the loop to exit. Does nothing if idle.
    ///
    /// No poll runs after this returns. Handler tasks already dispatched may
    /// still be finishing.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(poll) = lifecycle.take() else {
            return;
        };
        let _ = poll.stop.send(true);
        if let Err(err) = poll.task.await
            && err.is_panic()
        {
            warn!("Change detector loop panicked");
        }
        info!("Change detector stopped");
    }

    /// Whether the poll loop is running.
    pub async fn is_running(&self) -> bool {
        self.lifecycle.lock().await.is_some()
    }
}

impl<S> Drop for ChangeDetector<S> {
    fn drop(&mut self) {
        if let Some(poll) = self.lifecycle.get_mut().take() {
            poll.task.abort();
        }
    }
}

async fn poll_loop<S: MessageStore>(
    store: Arc<S>,
    handlers: Arc<HandlerRegistry>,
    config: DetectorConfig,
    mut state: WatcherState,
    mut stopped: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stopped.changed() => break,
            _ = interval.tick() => {}
        }

        let outcome = tokio::select! {
            biased;
            _ = stopped.changed() => break,
            outcome = state.tick(store.as_ref(), config.conversation_limit) => outcome,
        };

        match outcome {
            Ok(TickOutcome::Changed {
                messages,
                conversations,
            }) => {
                if !messages.is_empty() {
                    handlers.dispatch_messages(&messages);
                }
                handlers.dispatch_conversations(&conversations);
            }
            Ok(TickOutcome::Seeded { last_seen }) => {
                debug!(%last_seen, "Watcher seeded on first poll");
            }
            Ok(TickOutcome::Unchanged) => trace!("Poll: no change"),
            Err(err) => {
                warn!(error = %err, "Poll failed");
                handlers.dispatch_error(err);
            }
        }
    }
    debug!("Poll loop exited");
}
