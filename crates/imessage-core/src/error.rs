//! Error types for the core library.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The message store is missing or cannot be opened.
    #[error("Message store unavailable: {0}")]
    StoreUnavailable(String),

    /// The message store is locked by another writer; retrying later may succeed.
    #[error("Message store busy: {0}")]
    StoreBusy(String),

    /// Every delivery strategy failed.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// A single-flight operation is already in progress.
    #[error("Operation already in progress")]
    Busy,

    /// Another session holds the single-instance lock.
    #[error("Another instance is already running (lock file: {})", path.display())]
    LockHeld {
        /// Path of the lock file.
        path: PathBuf,
        /// Process id recorded by the current holder, if readable.
        holder: Option<u32>,
    },

    /// A dispatched handler returned an error or panicked.
    #[error("Handler fault in {handler} handler: {reason}")]
    HandlerFault {
        /// Which kind of handler failed.
        handler: &'static str,
        /// What went wrong.
        reason: String,
    },

    /// A bounded operation exceeded its time limit.
    #[error("{operation} timed out after {}s", after.as_secs_f32())]
    Timeout {
        /// Name of the operation that timed out.
        operation: &'static str,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// An operation needs a selected conversation but none is selected.
    #[error("No conversation selected")]
    NoSelection,

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
