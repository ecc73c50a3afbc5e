//! Pipeline worker.
//!
//! This crate provides:
//! - Handlers for every pipeline task, from story writing to publishing
//! - Store and service seams so handlers own only the fields they write
//! - The executor that consumes the per-handler streams
//! - Graceful shutdown

pub mod aggregate;
pub mod bulk_job;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod image_job;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod polling;
pub mod publish_job;
pub mod render_job;
pub mod scene_builder;
pub mod scene_track;
pub mod services;
pub mod signals;
pub mod store;
pub mod story_job;
pub mod sync_monitor;
pub mod voice_job;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::TaskLogger;
pub use pipeline::{Pipeline, PipelineBackend};
pub use services::Services;
pub use signals::Signals;
pub use store::FirestoreStore;
