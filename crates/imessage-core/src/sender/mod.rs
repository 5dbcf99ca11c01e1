//! Outgoing message delivery.

mod applescript;

use std::future::Future;

pub use applescript::{AppleScriptSender, DEFAULT_SEND_TIMEOUT, DeliveryStrategy};

use crate::Result;

/// Hands a message to the local messaging application.
///
/// Success means the application accepted the message, not that it was
/// delivered.
pub trait MessageSender: Send + Sync + 'static {
    /// Sends `text` to `recipient` (phone number, email, or chat identifier).
    fn send(&self, recipient: &str, text: &str) -> impl Future<Output = Result<()>> + Send;
}
