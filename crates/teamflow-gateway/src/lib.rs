//! HTTP and WebSocket surface for Teamflow.
//!
//! # Routes
//!
//! - `POST /api/tasks`: submit a request to a team.
//! - `GET /api/tasks/{id}`: poll a task snapshot.
//! - `GET /api/tasks?user_id=`: list tasks.
//! - `POST /api/tasks/{id}/feedback`: revise a finished artifact.
//! - `GET /api/teams`, `GET /api/stats`, `GET /health`.
//! - `GET /ws/tasks/{id}`: push progress stream.

/// REST handlers.
pub mod api;
/// Open progress stream bookkeeping.
pub mod connection;
/// Error to response mapping.
pub mod error;
/// Auth and rate-limit layers.
pub mod middleware;
/// Token bucket limiter.
pub mod rate_limit;
/// Input cleaning.
pub mod sanitizer;
/// Router assembly.
pub mod server;
/// WebSocket progress stream.
pub mod stream;

pub use error::ApiError;
pub use middleware::AuthConfig;
pub use rate_limit::RateLimiter;
pub use sanitizer::{SanitizeResult, Sanitizer};
pub use server::{AppState, GatewayServer};
