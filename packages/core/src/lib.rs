//! Core domain types for the job runtime.
//!
//! This crate contains shared types used across all packages:
//! - JobDefinition, JobStatus and RunState for recurring job instances
//! - QueueMessage for actor-owned mailboxes
//! - TimerRegistration for the durable timer facility
//! - The StateStore persistence seam

mod job;
mod queue;
mod store;
mod timer;

pub use job::{
    JobDefinition, JobState, JobStatus, RunId, RunState, status_timer_name, trigger_timer_name,
};
pub use queue::{MessageId, QueueMessage};
pub use store::{PersistenceError, StateStore, StoreFuture, load_json, save_json};
pub use timer::TimerRegistration;
