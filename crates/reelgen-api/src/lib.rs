//! Axum HTTP API.
//!
//! This crate provides:
//! - Endpoints that raise pipeline signals (process, render, publish)
//! - Bulk job creation, polling and cancellation
//! - Liveness and readiness probes
//! - Rate limiting, security headers and Prometheus metrics

pub mod checks;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

#[cfg(test)]
mod testing;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
