//! Message types for actor communication.

use std::time::Duration;

use chrono::{DateTime, Utc};
use jobs_core::{JobDefinition, JobStatus, PersistenceError, QueueMessage, RunId};
use ractor::rpc::CallResult;
use ractor::{ActorRef, Message, RpcReplyPort};
use tokio::sync::mpsc;

/// Messages for the JobActor.
#[derive(Debug)]
pub enum JobMessage {
    /// Set the definition and arm the state machine, once.
    Activate {
        definition: Box<JobDefinition>,
        reply: RpcReplyPort<Result<bool, String>>,
    },

    /// Arm (or re-arm) the recurring trigger timer.
    ScheduleRecurring {
        period: Duration,
        reply: RpcReplyPort<Result<(), String>>,
    },

    /// Get the status with a fresh run duration.
    Status { reply: RpcReplyPort<JobStatus> },

    /// Get the stored definition.
    Definition {
        reply: RpcReplyPort<Option<JobDefinition>>,
    },

    /// Report the current run as completed.
    ///
    /// `run_id` pins the report to a specific run; `None` targets whatever
    /// run is current.
    Complete {
        run_id: Option<RunId>,
        reply: RpcReplyPort<bool>,
    },

    /// Report the current run as failed.
    Fail {
        run_id: Option<RunId>,
        error: String,
        reply: RpcReplyPort<bool>,
    },

    /// Signal the current run's cancellation token.
    Cancel { reply: RpcReplyPort<bool> },

    /// Durable timer callback.
    Tick {
        timer_name: String,
        scheduled_at: DateTime<Utc>,
        period: Duration,
    },
}

/// Messages for the QueueActor.
#[derive(Debug)]
pub enum QueueActorMessage {
    /// Append a message to the back of the queue.
    Enqueue {
        message: Box<QueueMessage>,
        reply: RpcReplyPort<()>,
    },

    /// Pop the front message, if any.
    Dequeue {
        reply: RpcReplyPort<Option<QueueMessage>>,
    },

    /// Number of buffered messages.
    Len { reply: RpcReplyPort<usize> },

    /// Push a copy of every later enqueue to `sender`.
    Subscribe {
        subscriber_id: String,
        sender: mpsc::UnboundedSender<QueueMessage>,
        reply: RpcReplyPort<()>,
    },

    /// Stop notifying a subscriber.
    Unsubscribe {
        subscriber_id: String,
        reply: RpcReplyPort<bool>,
    },
}

/// Result type for actor operations.
pub type ActorResult<T> = Result<T, ActorError>;

/// Error type for actor operations.
#[derive(Debug, thiserror::Error)]
pub enum ActorError {
    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Handler already registered for queue '{0}'")]
    HandlerAlreadyRegistered(String),

    #[error("Actor unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to spawn actor: {0}")]
    Spawn(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout")]
    Timeout,
}

/// Request/reply call into an actor with a timeout.
pub(crate) async fn call<M, T, F>(actor: &ActorRef<M>, build: F, timeout: Duration) -> ActorResult<T>
where
    M: Message,
    T: Send + 'static,
    F: FnOnce(RpcReplyPort<T>) -> M,
{
    match ractor::rpc::call(actor, build, Some(timeout)).await {
        Ok(CallResult::Success(value)) => Ok(value),
        Ok(CallResult::Timeout) => Err(ActorError::Timeout),
        Ok(CallResult::SenderError) => Err(ActorError::Unavailable("reply dropped".into())),
        Err(_) => Err(ActorError::Unavailable("mailbox closed".into())),
    }
}
