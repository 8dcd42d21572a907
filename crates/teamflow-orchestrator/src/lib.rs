//! Task coordination for Teamflow: registry, team pipelines, progress
//! broadcasting and submission deduplication.
//!
//! # Main types
//!
//! - [`Orchestrator`]: Service facade: submit, status, feedback, maintenance.
//! - [`TaskRegistry`]: Process-wide task state with per-task locking.
//! - [`Pipeline`] / [`PipelineRunner`]: Sequential [`AgentStep`]s with per-step failure policy.
//! - [`ProgressBroadcaster`]: Push delivery of progress events to subscribers.
//! - [`DeduplicationCache`]: Short-lived fingerprint cache of submissions.
//! - [`TeamRouter`]: Built-in team pipelines and keyword routing.

/// Progress fan-out to subscribers.
pub mod broadcaster;
/// Submission de-duplication.
pub mod dedup;
/// The orchestrator service.
pub mod engine;
/// Write-through progress log.
pub mod persistence;
/// Pipeline definition and execution.
pub mod pipeline;
/// In-memory task registry.
pub mod registry;
/// Generic step kinds.
pub mod steps;
/// Team definitions and routing.
pub mod teams;

pub use broadcaster::{ProgressBroadcaster, Subscription};
pub use dedup::{Claim, DeduplicationCache};
pub use engine::{
    FeedbackMode, FeedbackResponse, Orchestrator, OrchestratorConfig, SubmitRequest, Submission,
};
pub use persistence::{JsonlProgressLog, NoopProgressLog, ProgressLog, ProgressLogEntry};
pub use pipeline::{AgentStep, FailurePolicy, Pipeline, PipelineRunner, PipelineStep, StepContext};
pub use registry::{RegistryConfig, RegistryStats, TaskRegistry};
pub use steps::{compile_artifact, CompileStep, ImageStep, PromptStep, SearchStep};
pub use teams::{StepSummary, TeamDefinition, TeamRouter, TeamSummary};
