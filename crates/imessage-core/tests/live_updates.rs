//! The detector and session over a real database file.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Fixture, Row, at};
use imessage_core::session::{self, RenderUpdate, Status};
use imessage_core::{
    ChangeDetector, ChatId, DetectorConfig, MessageSender, Result, SessionConfig,
    SessionController,
};

struct NullSender;

impl MessageSender for NullSender {
    async fn send(&self, _recipient: &str, _text: &str) -> Result<()> {
        Ok(())
    }
}

fn is_new_message(update: &RenderUpdate) -> bool {
    matches!(update, RenderUpdate::Status(Status::NewMessage { .. }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_message_reaches_open_conversation() {
    let fixture = Fixture::populated().await;
    let store = Arc::new(fixture.store());
    let (updates, mut receiver) = session::channel();
    let session = SessionController::new(
        Arc::clone(&store),
        Arc::new(NullSender),
        SessionConfig::default(),
        updates,
    );
    session.load_initial().await.unwrap();
    assert_eq!(session.selected(), Some(ChatId(2)));

    let detector = ChangeDetector::new(
        Arc::clone(&store),
        DetectorConfig {
            poll_interval: Duration::from_millis(50),
            conversation_limit: 50,
        },
    );
    session.attach(&detector);
    detector.start().await;

    // Existing history is never reported as new.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!receiver.drain().iter().any(is_new_message));

    fixture
        .add_message(Row::text(6, 2, 2, "almost there", at(30)))
        .await;

    let mut seen = Vec::new();
    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        let (mut messages_seen, mut list_seen) = (false, false);
        while let Some(update) = receiver.recv().await {
            match &update {
                RenderUpdate::Messages { chat_id, messages } if *chat_id == ChatId(2) => {
                    messages_seen |= messages.iter().any(|msg| msg.text == "almost there");
                }
                RenderUpdate::Conversations(list) => {
                    list_seen |= list
                        .first()
                        .is_some_and(|conv| conv.last_message_text == "almost there");
                }
                _ => {}
            }
            seen.push(update);
            if messages_seen && list_seen {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    detector.stop().await;

    assert!(delivered);
    assert!(seen.contains(&RenderUpdate::Status(Status::NewMessage {
        from: "+15550002".into(),
    })));
    let state = session.snapshot();
    assert_eq!(state.messages.last().map(|msg| msg.text.as_str()), Some("almost there"));
    assert_eq!(state.conversations[0].last_message_text, "almost there");
}
