//! Handler registration and fault-isolated dispatch.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::model::{Conversation, Message};
use crate::{Error, Result};

/// Future returned by a registered handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

type Handler<T> = Arc<dyn Fn(T) -> HandlerFuture + Send + Sync>;

/// Message, conversation and error handlers, in registration order.
///
/// Registration appends and may happen while dispatches run. A dispatch
/// works on a snapshot of the list taken at the moment it starts.
#[derive(Default)]
pub struct HandlerRegistry {
    messages: RwLock<Vec<Handler<Vec<Message>>>>,
    conversations: RwLock<Vec<Handler<Vec<Conversation>>>>,
    errors: RwLock<Vec<Handler<Arc<Error>>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("messages", &len(&self.messages))
            .field("conversations", &len(&self.conversations))
            .field("errors", &len(&self.errors))
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler for batches of new messages.
    pub fn register_message_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Vec<Message>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        push(&self.messages, boxed(handler));
    }

    /// Adds a handler for refreshed conversation lists.
    pub fn register_conversation_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Vec<Conversation>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        push(&self.conversations, boxed(handler));
    }

    /// Adds a handler for store failures.
    pub fn register_error_handler<F, Fut>(&self, handler: F)
    where
        F: Fn(Arc<Error>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        push(&self.errors, boxed(handler));
    }

    /// Hands `batch` to every message handler, each in its own task.
    pub fn dispatch_messages(&self, batch: &[Message]) -> Vec<JoinHandle<()>> {
        snapshot(&self.messages)
            .into_iter()
            .map(|handler| spawn_isolated("message", handler, batch.to_vec()))
            .collect()
    }

    /// Hands `conversations` to every conversation handler, each in its own task.
    pub fn dispatch_conversations(&self, conversations: &[Conversation]) -> Vec<JoinHandle<()>> {
        snapshot(&self.conversations)
            .into_iter()
            .map(|handler| spawn_isolated("conversation", handler, conversations.to_vec()))
            .collect()
    }

    /// Hands `error` to every error handler; dropped when none are registered.
    pub fn dispatch_error(&self, error: Error) -> Vec<JoinHandle<()>> {
        let handlers = snapshot(&self.errors);
        if handlers.is_empty() {
            debug!(error = %error, "No error handlers registered; dropping error");
            return Vec::new();
        }
        let error = Arc::new(error);
        handlers
            .into_iter()
            .map(|handler| spawn_isolated("error", handler, Arc::clone(&error)))
            .collect()
    }
}

fn boxed<T, F, Fut>(handler: F) -> Handler<T>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |payload: T| -> HandlerFuture { Box::pin(handler(payload)) })
}

fn push<T>(list: &RwLock<Vec<Handler<T>>>, handler: Handler<T>) {
    list.write()
        .unwrap_or_else(PoisonError::into_inner)
        .push(handler);
}

fn snapshot<T>(list: &RwLock<Vec<Handler<T>>>) -> Vec<Handler<T>> {
    list.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn len<T>(list: &RwLock<Vec<Handler<T>>>) -> usize {
    list.read().unwrap_or_else(PoisonError::into_inner).len()
}

/// Runs one handler in its own task. An error or panic is logged and goes
/// no further.
fn spawn_isolated<T: Send + 'static>(
    kind: &'static str,
    handler: Handler<T>,
    payload: T,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = tokio::spawn(async move { handler(payload).await }).await;
        let reason = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err.to_string(),
            Err(join) if join.is_panic() => panic_message(join.into_panic().as_ref()),
            Err(join) => join.to_string(),
        };
        let fault = Error::HandlerFault {
            handler: kind,
            reason,
        };
        warn!(error = %fault, "Handler failed");
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic".to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{ChatId, MessageId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch() -> Vec<Message> {
        vec![Message::new(MessageId(1), ChatId(1), "hi")]
    }

    async fn join_all(handles: Vec<JoinHandle<()>>) {
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_faulty_handlers_do_not_affect_others() {
        let registry = HandlerRegistry::new();
        let delivered = Arc::new(AtomicUsize::new(0));

        registry.register_message_handler(|batch: Vec<Message>| async move {
            if !batch.is_empty() {
                panic!("boom");
            }
            Ok::<(), Error>(())
        });
        registry.register_message_handler(|_| async { Err::<(), _>(Error::Busy) });
        let counter = Arc::clone(&delivered);
        registry.register_message_handler(move |batch| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(batch.len(), Ordering::SeqCst);
                Ok::<(), Error>(())
            }
        });

        join_all(registry.dispatch_messages(&batch())).await;
        join_all(registry.dispatch_messages(&batch())).await;
        assert_eq!(delivered.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_errors_reach_every_error_handler() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let seen = Arc::clone(&seen);
            registry.register_error_handler(move |err| {
                let seen = Arc::clone(&seen);
                async move {
                    assert!(matches!(*err, Error::StoreBusy(_)));
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), Error>(())
                }
            });
        }
        join_all(registry.dispatch_error(Error::StoreBusy("locked".into()))).await;
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_without_handlers_is_dropped() {
        let registry = HandlerRegistry::new();
        assert!(registry.dispatch_error(Error::Busy).is_empty());
    }

    #[tokio::test]
    async fn test_registration_during_dispatch_uses_snapshot() {
        let registry = Arc::new(HandlerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let inner_registry = Arc::clone(&registry);
        let inner_calls = Arc::clone(&calls);
        registry.register_conversation_handler(move |_| {
            let registry = Arc::clone(&inner_registry);
            let calls = Arc::clone(&inner_calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let late_calls = Arc::clone(&calls);
                registry.register_conversation_handler(move |_| {
                    let late_calls = Arc::clone(&late_calls);
                    async move {
                        late_calls.fetch_add(100, Ordering::SeqCst);
                        Ok::<(), Error>(())
                    }
                });
                Ok::<(), Error>(())
            }
        });

        let handles = registry.dispatch_conversations(&[]);
        assert_eq!(handles.len(), 1);
        join_all(handles).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(format!("{registry:?}").matches("conversations: 2").count(), 1);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "panic");
    }
}
