//! Actor system for the job runtime.
//!
//! This crate provides the Ractor-based entities that run recurring jobs and
//! the queues they exchange work through.
//!
//! # Architecture
//!
//! - `EntityRegistry` - Resolves a key to exactly one live actor per entity type
//! - `JobActor` - Owns one job's persisted state and run lifecycle
//! - `QueueActor` - Owns a single named FIFO mailbox
//! - `TimerService` - Durable timers that re-arm from the store after a restart
//! - `QueueClient` - Producer calls and background handler poll loops
//! - `JobScheduler` - Activates jobs and arms their recurring triggers
//!
//! # Usage
//!
//! ```ignore
//! use actors::{EntityRegistry, JobScheduler, JobTypeRegistry, RuntimeConfig};
//!
//! let mut job_types = JobTypeRegistry::new();
//! job_types.register(actors::job_fn!("report", |ctx| Ok(())));
//!
//! let registry = EntityRegistry::open(RuntimeConfig::default(), job_types).await?;
//! let scheduler = JobScheduler::new(registry.clone());
//! scheduler.schedule_recurring("report", "daily-report", Duration::from_secs(60)).await?;
//! ```

mod config;
mod job;
mod job_actor;
mod messages;
mod persistence;
mod queue_actor;
mod queue_client;
mod registry;
mod scheduler;
mod timers;

pub use config::{RuntimeConfig, StoreBackend};
pub use job::{FnJob, Job, JobContext, JobFuture, JobResult, JobTypeRegistry};
pub use job_actor::{JobActor, JobHandle};
pub use messages::{ActorError, ActorResult, JobMessage, QueueActorMessage};
pub use persistence::{FileStore, MemoryStore};
pub use queue_actor::{QueueActor, QueueHandle};
pub use queue_client::{HandlerFuture, HandlerResult, MessageHandler, QueueClient};
pub use registry::EntityRegistry;
pub use scheduler::JobScheduler;
pub use timers::TimerService;

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort};
