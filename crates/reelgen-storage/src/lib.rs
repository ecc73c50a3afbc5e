//! Cloudflare R2 asset storage.
//!
//! Scene images and narration audio are stored here and
//! referenced from the video record by their public URL.

pub mod client;
pub mod error;
pub mod keys;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
