//! Process-local queue client: producer calls and background poll loops.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{FutureExt, Stream, stream};
use jobs_core::QueueMessage;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::messages::{ActorError, ActorResult};
use crate::registry::EntityRegistry;

/// Result type for queue handlers.
pub type HandlerResult = Result<(), String>;

/// Future type for async queue handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// A queue handler, invoked once per dequeued message.
pub type MessageHandler = Arc<dyn Fn(QueueMessage) -> HandlerFuture + Send + Sync>;

struct HandlerSlot {
    owner: u64,
    token: CancellationToken,
}

/// Process-wide handler slots, owned by the entity registry so every
/// [`QueueClient`] built over it sees the same claims.
#[derive(Default)]
pub(crate) struct HandlerSlots {
    slots: Mutex<HashMap<String, HandlerSlot>>,
    next_owner: AtomicU64,
}

impl HandlerSlots {
    fn new_owner(&self) -> u64 {
        self.next_owner.fetch_add(1, Ordering::Relaxed)
    }

    async fn claim(&self, queue: &str, owner: u64) -> ActorResult<CancellationToken> {
        let mut slots = self.slots.lock().await;
        if slots.contains_key(queue) {
            return Err(ActorError::HandlerAlreadyRegistered(queue.to_string()));
        }
        let token = CancellationToken::new();
        slots.insert(
            queue.to_string(),
            HandlerSlot {
                owner,
                token: token.clone(),
            },
        );
        Ok(token)
    }

    async fn release(&self, queue: &str) -> bool {
        match self.slots.lock().await.remove(queue) {
            Some(slot) => {
                slot.token.cancel();
                true
            }
            None => false,
        }
    }

    async fn release_owned_by(&self, owner: u64) {
        self.slots.lock().await.retain(|_, slot| {
            if slot.owner == owner {
                slot.token.cancel();
                false
            } else {
                true
            }
        });
    }

    async fn contains(&self, queue: &str) -> bool {
        self.slots.lock().await.contains_key(queue)
    }

    pub(crate) async fn cancel_all(&self) {
        for (_, slot) in self.slots.lock().await.drain() {
            slot.token.cancel();
        }
    }
}

/// Client for sending to and consuming from queue actors.
///
/// A queue has at most one handler per process: the slots live in the
/// entity registry, so a second client over the same registry cannot claim
/// a queue that is already handled. Each handler runs its own poll loop
/// until removed or its client shuts down.
#[derive(Clone)]
pub struct QueueClient {
    registry: EntityRegistry,
    owner: u64,
    poll_interval: Duration,
}

impl QueueClient {
    pub fn new(registry: EntityRegistry) -> Self {
        let poll_interval = registry.config().poll_interval;
        let owner = registry.handlers().new_owner();
        Self {
            registry,
            owner,
            poll_interval,
        }
    }

    /// Enqueue a message on the named queue.
    pub async fn send_message(&self, queue: &str, message: QueueMessage) -> ActorResult<()> {
        self.registry.queue(queue).await?.enqueue(message).await
    }

    /// Pop one message without waiting.
    pub async fn dequeue(&self, queue: &str) -> ActorResult<Option<QueueMessage>> {
        self.registry.queue(queue).await?.dequeue().await
    }

    /// Drain up to `batch_size` messages.
    ///
    /// The stream is lazy: each item is dequeued when polled, and the stream
    /// ends as soon as the queue reports empty, the size is reached, or a call
    /// fails (the error is yielded as the last item).
    pub fn dequeue_batch(
        &self,
        queue: &str,
        batch_size: usize,
    ) -> impl Stream<Item = ActorResult<QueueMessage>> + Send + 'static {
        let registry = self.registry.clone();
        let queue = queue.to_string();

        stream::unfold(
            (registry, queue, 0usize, false),
            move |(registry, queue, taken, done)| async move {
                if done || taken >= batch_size {
                    return None;
                }
                let popped = match registry.queue(&queue).await {
                    Ok(handle) => handle.dequeue().await,
                    Err(e) => Err(e),
                };
                match popped {
                    Ok(Some(message)) => Some((Ok(message), (registry, queue, taken + 1, false))),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), (registry, queue, taken, true))),
                }
            },
        )
    }

    /// Register the handler for a queue and start its poll loop.
    ///
    /// Fails if any client in this process already handles the queue.
    pub async fn register_handler<F, Fut>(&self, queue: &str, handler: F) -> ActorResult<()>
    where
        F: Fn(QueueMessage) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: MessageHandler =
            Arc::new(move |message| -> HandlerFuture { Box::pin(handler(message)) });
        let token = self.registry.handlers().claim(queue, self.owner).await?;

        tracing::info!(queue = %queue, "Registered queue handler");
        tokio::spawn(poll_loop(
            self.clone(),
            queue.to_string(),
            handler,
            token,
        ));
        Ok(())
    }

    /// Stop the poll loop for a queue, whichever client registered it.
    /// Returns false if none was registered.
    pub async fn remove_handler(&self, queue: &str) -> bool {
        let removed = self.registry.handlers().release(queue).await;
        if removed {
            tracing::info!(queue = %queue, "Removed queue handler");
        }
        removed
    }

    /// Check whether any client in this process handles the queue.
    pub async fn has_handler(&self, queue: &str) -> bool {
        self.registry.handlers().contains(queue).await
    }

    /// Subscribe to push notifications of messages enqueued from now on.
    ///
    /// Notifications are copies; the message stays queued for consumers.
    /// A subscriber id that is already registered is replaced.
    pub async fn subscribe(
        &self,
        queue: &str,
        subscriber_id: &str,
    ) -> ActorResult<mpsc::UnboundedReceiver<QueueMessage>> {
        self.registry.queue(queue).await?.subscribe(subscriber_id).await
    }

    /// Drop a subscriber. Returns false if it was not registered.
    pub async fn unsubscribe(&self, queue: &str, subscriber_id: &str) -> ActorResult<bool> {
        self.registry.queue(queue).await?.unsubscribe(subscriber_id).await
    }

    /// Stop every poll loop started by this client.
    pub async fn shutdown(&self) {
        self.registry.handlers().release_owned_by(self.owner).await;
    }
}

async fn poll_loop(
    client: QueueClient,
    queue: String,
    handler: MessageHandler,
    token: CancellationToken,
) {
    while !token.is_cancelled() {
        match client.dequeue(&queue).await {
            Ok(Some(message)) => {
                let message_id = message.id;
                let call = handler.clone();
                let outcome = AssertUnwindSafe(async move { call(message).await })
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => tracing::warn!(
                        queue = %queue,
                        message_id = %message_id,
                        "Error processing message: {}",
                        e
                    ),
                    Err(_) => tracing::warn!(
                        queue = %queue,
                        message_id = %message_id,
                        "Handler panicked while processing message"
                    ),
                }
            }
            Ok(None) => idle(&token, client.poll_interval).await,
            Err(e) => {
                tracing::warn!(queue = %queue, "Failed to poll queue: {}", e);
                idle(&token, client.poll_interval).await;
            }
        }
    }

    tracing::debug!(queue = %queue, "Poll loop stopped");
}

async fn idle(token: &CancellationToken, interval: Duration) {
    tokio::select! {
        _ = token.cancelled() => {}
        _ = tokio::time::sleep(interval) => {}
    }
}
