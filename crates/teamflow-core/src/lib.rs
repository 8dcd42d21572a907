//! Core types and error definitions for the Teamflow task backend.
//!
//! This crate provides the foundational types shared across all Teamflow crates:
//! the error taxonomy, the task lifecycle model, progress events and the
//! field-addressable artifact produced by a team pipeline.
//!
//! # Main types
//!
//! - [`TeamflowError`]: Unified error enum for all Teamflow subsystems.
//! - [`TeamflowResult`]: Convenience alias for `Result<T, TeamflowError>`.
//! - [`TaskState`]: Mutable state of one submitted task.
//! - [`StepResult`]: Immutable outcome of one agent step.
//! - [`ProgressEvent`]: Structured event delivered to progress subscribers.
//! - [`Artifact`]: Named-field output of a pipeline (title, content, images, ...).

/// Field-addressable pipeline output.
pub mod artifact;
/// Progress events streamed to subscribers.
pub mod event;
/// Task lifecycle model.
pub mod task;

pub use artifact::{clean_title, extract_title, fields, html_escape, Artifact};
pub use event::{EventKind, ProgressEvent};
pub use task::{Priority, StepResult, StepStatus, TaskId, TaskState, TaskStatus};

// --- Error types ---

/// Top-level error type for Teamflow.
///
/// Each variant corresponds to one failure class of the coordination layer
/// or to the plumbing underneath it.
#[derive(Debug, thiserror::Error)]
pub enum TeamflowError {
    /// The caller referenced a task id the registry does not know.
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// A write was attempted that the task lifecycle does not allow
    /// (e.g. recording a step on a finalized task).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An agent step failed or its external call raised.
    #[error("Step '{step}' failed: {reason}")]
    StepFailed {
        /// Name of the failing step.
        step: String,
        /// Human-readable failure reason.
        reason: String,
    },

    /// An external call exceeded its time budget.
    #[error("Timeout: {operation} did not finish within {after_ms}ms")]
    Timeout {
        /// What was being waited on.
        operation: String,
        /// The budget that was exceeded.
        after_ms: u64,
    },

    /// The same team + request was submitted again within the dedup window.
    #[error("Duplicate submission: {0}")]
    DuplicateSubmission(String),

    /// A targeted artifact update could not be completed.
    #[error("Targeted update failed: {0}")]
    TargetedUpdate(String),

    /// An error from an outbound HTTP request (LLM, search or image API).
    #[error("HTTP error: {0}")]
    Http(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the HTTP / WebSocket gateway layer.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TeamflowError {
    /// Shorthand for a [`TeamflowError::StepFailed`].
    pub fn step(step: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StepFailed {
            step: step.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code used in structured error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TaskNotFound(_) => "task_not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::StepFailed { .. } => "step_failed",
            Self::Timeout { .. } => "timeout",
            Self::DuplicateSubmission(_) => "duplicate_submission",
            Self::TargetedUpdate(_) => "targeted_update_failed",
            Self::Http(_) => "upstream_error",
            Self::Config(_) => "config_error",
            Self::Gateway(_) => "gateway_error",
            Self::Json(_) => "invalid_json",
            Self::Io(_) => "io_error",
        }
    }
}

/// A convenience `Result` alias using [`TeamflowError`].
pub type TeamflowResult<T> = Result<T, TeamflowError>;
