//! Redis Streams task queue.
//!
//! This crate provides:
//! - Task payloads for every pipeline handler
//! - Per-handler streams with delayed delivery
//! - Retry with backoff and a dead-letter stream

pub mod error;
pub mod job;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use job::{
    BulkTask, ImageTask, MarkerTask, MissingFields, PublishTask, QueueTask, StoryTask, SyncTask,
    TaskEnvelope, TaskKind, VoiceTask,
};
pub use queue::{claimed_attempt, Delivery, HandlerLimits, JobQueue, QueueConfig, TaskQueue};
