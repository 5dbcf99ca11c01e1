//! Change detection for the message store.
//!
//! [`ChangeDetector`] polls the store's modification signal and, when it
//! moves, reports messages past its watermark and the refreshed
//! conversation list to registered handlers. Each handler runs in its own
//! task, so a slow or failing handler never holds up the poll loop.

mod detector;
mod registry;
mod state;

pub use detector::{
    ChangeDetector, DEFAULT_CONVERSATION_LIMIT, DEFAULT_POLL_INTERVAL, DetectorConfig,
};
pub use registry::{HandlerFuture, HandlerRegistry};
pub use state::{TickOutcome, WatcherState};
