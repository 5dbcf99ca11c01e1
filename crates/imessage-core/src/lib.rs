//! # imessage-core
//!
//! Core logic for the `imessage` terminal client.
//!
//! This crate provides:
//! - Read-only access to the macOS Messages database (`SQLite`)
//! - Domain models for conversations and messages
//! - Contact name resolution from the local address book
//! - Sending through Messages.app via `AppleScript`
//! - **Change detection** - polls the store and dispatches new messages to handlers
//! - **Session control** - selection, refresh and send with single-flight guards
//! - **Single-instance lock** - one live session per user

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod contacts;
mod error;
pub mod lock;
pub mod model;
pub mod sender;
pub mod session;
pub mod store;
pub mod watcher;

pub use config::Config;
pub use contacts::{AddressBook, ContactResolver};
pub use error::{Error, Result};
pub use lock::SingleInstanceLock;
pub use model::{ChatId, ChatRef, Conversation, Message, MessageId};
pub use sender::{AppleScriptSender, MessageSender};
pub use session::{RenderUpdate, SessionConfig, SessionController, Status, UpdateReceiver};
pub use store::{ChatDb, MemoryStore, MessageStore, StoreVersion};
pub use watcher::{ChangeDetector, DetectorConfig};
