//! Live view state and single-flight flags.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::model::{ChatId, Conversation, Message};

/// What the session currently shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Conversations, most recent first.
    pub conversations: Vec<Conversation>,
    /// Conversation whose messages are shown.
    pub selected: Option<ChatId>,
    /// Messages of the selected conversation, oldest first.
    pub messages: Vec<Message>,
    /// Ticket of the load that produced `messages`.
    pub(crate) messages_load: u64,
}

impl SessionState {
    /// The selected conversation, if it is in the list.
    #[must_use]
    pub fn selected_conversation(&self) -> Option<&Conversation> {
        let selected = self.selected?;
        self.conversations.iter().find(|conv| conv.id == selected)
    }

    /// Stores `messages` loaded for `chat_id` under `ticket`.
    ///
    /// Returns `false` and leaves the state alone when `chat_id` is no longer
    /// selected or a load that started later has already been kept.
    pub(crate) fn accept_messages(
        &mut self,
        chat_id: ChatId,
        ticket: u64,
        messages: &[Message],
    ) -> bool {
        if self.selected != Some(chat_id) || ticket < self.messages_load {
            return false;
        }
        self.messages = messages.to_vec();
        self.messages_load = ticket;
        true
    }
}

/// Holds a single-flight flag set until dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    /// Sets `flag` if it was clear. `None` means the operation is already running.
    #[must_use]
    pub fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
