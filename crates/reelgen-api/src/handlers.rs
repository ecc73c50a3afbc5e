//! Request handlers.

pub mod bulk_jobs;
pub mod health;
pub mod videos;

pub use bulk_jobs::*;
pub use health::*;
pub use videos::*;
