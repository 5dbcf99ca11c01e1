//! The queue that carries background results to the rendering loop.

use std::fmt;

use tokio::sync::mpsc;
use tracing::trace;

use crate::Error;
use crate::model::{ChatId, Conversation, Message};

/// A change the rendering loop should apply to what it shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderUpdate {
    /// Replace the conversation list.
    Conversations(Vec<Conversation>),
    /// A message load for `chat_id` has started.
    MessagesLoading {
        /// Conversation being loaded.
        chat_id: ChatId,
    },
    /// Messages loaded for `chat_id`; stale if the selection has moved on.
    Messages {
        /// Conversation the messages were fetched for.
        chat_id: ChatId,
        /// Messages, oldest first.
        messages: Vec<Message>,
    },
    /// Put unsent text back into the input line.
    RestoreInput(String),
    /// Show a status line.
    Status(Status),
}

/// Status line contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// A send is in progress.
    Sending,
    /// Messages accepted the message.
    Sent,
    /// A send was rejected because another is in flight.
    SendBusy,
    /// Every delivery strategy failed.
    SendFailed(String),
    /// The send did not finish in time; it may still go out.
    SendTimedOut,
    /// An operation needed a selected conversation.
    NoSelection,
    /// A refresh is in progress.
    Refreshing,
    /// A refresh completed.
    Refreshed,
    /// A bounded store operation ran out of time.
    TimedOut {
        /// What timed out.
        operation: &'static str,
    },
    /// The store is locked by its owner.
    StoreBusy,
    /// The store cannot be opened.
    StoreUnavailable(String),
    /// A message arrived from someone else.
    NewMessage {
        /// Sender display name.
        from: String,
    },
    /// Any other failure.
    Error(String),
}

impl Status {
    /// Status describing a background failure.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Timeout {
                operation: "send", ..
            } => Self::SendTimedOut,
            Error::Timeout { operation, .. } => Self::TimedOut {
                operation: *operation,
            },
            Error::StoreBusy(_) => Self::StoreBusy,
            Error::StoreUnavailable(reason) => Self::StoreUnavailable(reason.clone()),
            Error::SendFailed(reason) => Self::SendFailed(reason.clone()),
            Error::Busy => Self::SendBusy,
            Error::NoSelection => Self::NoSelection,
            other => Self::Error(other.to_string()),
        }
    }

    /// Whether this status reports a problem.
    #[must_use]
    pub const fn is_problem(&self) -> bool {
        matches!(
            self,
            Self::SendBusy
                | Self::SendFailed(_)
                | Self::SendTimedOut
                | Self::NoSelection
                | Self::TimedOut { .. }
                | Self::StoreBusy
                | Self::StoreUnavailable(_)
                | Self::Error(_)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sending => f.write_str("Sending..."),
            Self::Sent => f.write_str("Message sent"),
            Self::SendBusy => f.write_str("Already sending a message..."),
            Self::SendFailed(reason) => write!(f, "Send failed: {reason}"),
            Self::SendTimedOut => {
                f.write_str("Send timed out; it may still be delivered, check before resending")
            }
            Self::NoSelection => f.write_str("No conversation selected"),
            Self::Refreshing => f.write_str("Refreshing..."),
            Self::Refreshed => f.write_str("Refreshed"),
            Self::TimedOut { operation } => {
                write!(f, "{operation} timed out, database may be busy")
            }
            Self::StoreBusy => f.write_str("Message database busy, will retry"),
            Self::StoreUnavailable(reason) => write!(f, "Message database unavailable: {reason}"),
            Self::NewMessage { from } => write!(f, "New message from {from}"),
            Self::Error(reason) => write!(f, "Error: {reason}"),
        }
    }
}

/// Creates a connected update queue.
#[must_use]
pub fn channel() -> (UpdateSender, UpdateReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UpdateSender { tx }, UpdateReceiver { rx })
}

/// Producer side; cheap to clone into background tasks.
#[derive(Debug, Clone)]
pub struct UpdateSender {
    tx: mpsc::UnboundedSender<RenderUpdate>,
}

impl UpdateSender {
    /// Queues an update. Dropped silently once the renderer is gone.
    pub fn push(&self, update: RenderUpdate) {
        if self.tx.send(update).is_err() {
            trace!("Render queue closed; update dropped");
        }
    }

    /// Queues a status line.
    pub fn status(&self, status: Status) {
        self.push(RenderUpdate::Status(status));
    }
}

/// Consumer side, owned by the rendering loop.
#[derive(Debug)]
pub struct UpdateReceiver {
    rx: mpsc::UnboundedReceiver<RenderUpdate>,
}

impl UpdateReceiver {
    /// Takes every update queued so far without waiting.
    pub fn drain(&mut self) -> Vec<RenderUpdate> {
        let mut updates = Vec::new();
        while let Ok(update) = self.rx.try_recv() {
            updates.push(update);
        }
        updates
    }

    /// Waits for the next update; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<RenderUpdate> {
        self.rx.recv().await
    }
}
