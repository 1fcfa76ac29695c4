//! Queue actor owning a single named FIFO mailbox.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use jobs_core::QueueMessage;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::mpsc;

use crate::messages::{ActorResult, QueueActorMessage, call};

/// State for the queue actor.
pub struct QueueActorState {
    /// Queue name, also the entity key.
    pub name: String,
    /// Buffered messages, oldest first.
    messages: VecDeque<QueueMessage>,
    /// Push subscribers by id. Not persisted.
    subscribers: HashMap<String, mpsc::UnboundedSender<QueueMessage>>,
}

impl QueueActorState {
    /// Create an empty queue state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            messages: VecDeque::new(),
            subscribers: HashMap::new(),
        }
    }

    fn notify_subscribers(&mut self, message: &QueueMessage) {
        let queue = &self.name;
        self.subscribers.retain(|subscriber_id, sender| {
            let delivered = sender.send(message.clone()).is_ok();
            if !delivered {
                tracing::debug!(queue = %queue, subscriber = %subscriber_id, "Dropping closed subscriber");
            }
            delivered
        });
    }
}

/// Queue actor that manages a single queue.
///
/// The buffer lives in memory only; a dequeued message is delivered and
/// cannot be recovered.
pub struct QueueActor;

impl Actor for QueueActor {
    type Msg = QueueActorMessage;
    type State = QueueActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        name: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting queue actor: {}", name);
        Ok(QueueActorState::new(name))
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            QueueActorMessage::Enqueue { message, reply } => {
                tracing::debug!(queue = %state.name, message_id = %message.id, "Enqueued message");
                state.notify_subscribers(&message);
                state.messages.push_back(*message);
                let _ = reply.send(());
            }

            QueueActorMessage::Dequeue { reply } => {
                let _ = reply.send(state.messages.pop_front());
            }

            QueueActorMessage::Len { reply } => {
                let _ = reply.send(state.messages.len());
            }

            QueueActorMessage::Subscribe {
                subscriber_id,
                sender,
                reply,
            } => {
                tracing::debug!(queue = %state.name, subscriber = %subscriber_id, "Registered subscriber");
                state.subscribers.insert(subscriber_id, sender);
                let _ = reply.send(());
            }

            QueueActorMessage::Unsubscribe {
                subscriber_id,
                reply,
            } => {
                let _ = reply.send(state.subscribers.remove(&subscriber_id).is_some());
            }
        }

        Ok(())
    }
}

/// Typed handle to a queue actor.
#[derive(Clone)]
pub struct QueueHandle {
    actor: ActorRef<QueueActorMessage>,
    timeout: Duration,
}

impl QueueHandle {
    pub(crate) fn new(actor: ActorRef<QueueActorMessage>, timeout: Duration) -> Self {
        Self { actor, timeout }
    }

    /// Append a message.
    pub async fn enqueue(&self, message: QueueMessage) -> ActorResult<()> {
        call(
            &self.actor,
            |reply| QueueActorMessage::Enqueue {
                message: Box::new(message),
                reply,
            },
            self.timeout,
        )
        .await
    }

    /// Pop the oldest message without waiting.
    pub async fn dequeue(&self) -> ActorResult<Option<QueueMessage>> {
        call(&self.actor, |reply| QueueActorMessage::Dequeue { reply }, self.timeout).await
    }

    /// Number of buffered messages.
    pub async fn len(&self) -> ActorResult<usize> {
        call(&self.actor, |reply| QueueActorMessage::Len { reply }, self.timeout).await
    }

    pub async fn is_empty(&self) -> ActorResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Register a push subscriber and return its notification stream.
    pub async fn subscribe(
        &self,
        subscriber_id: &str,
    ) -> ActorResult<mpsc::UnboundedReceiver<QueueMessage>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        call(
            &self.actor,
            |reply| QueueActorMessage::Subscribe {
                subscriber_id: subscriber_id.to_string(),
                sender,
                reply,
            },
            self.timeout,
        )
        .await?;
        Ok(receiver)
    }

    /// Remove a push subscriber. Returns false if it was not registered.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> ActorResult<bool> {
        call(
            &self.actor,
            |reply| QueueActorMessage::Unsubscribe {
                subscriber_id: subscriber_id.to_string(),
                reply,
            },
            self.timeout,
        )
        .await
    }
}
