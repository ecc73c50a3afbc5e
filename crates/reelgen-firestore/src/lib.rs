//! Firestore REST record store.
//!
//! This crate provides:
//! - A REST client with cached service-account auth (or the emulator),
//!   retry with backoff, and request metrics
//! - Masked partial updates addressed by field path
//! - Compare-and-swap writes keyed on the document update time
//! - Typed repositories for videos, markers, bulk jobs, story requests,
//!   templates and channels

pub mod auth;
pub mod client;
pub mod error;
pub mod fields;
pub mod metrics;
pub mod repos;
pub mod retry;
pub mod types;


pub use client::{FirestoreClient, FirestoreConfig};
pub use error::{FirestoreError, FirestoreResult};
pub use fields::{FieldPath, FieldUpdates};
pub use repos::{
    BulkJobRepository, CatalogRepository, ChannelRepository, MarkerRepository, StoryRequestRepository, Track,
    VideoRepository,
};
pub use retry::RetryConfig;
pub use types::{Document, ToFirestoreValue, Value};
