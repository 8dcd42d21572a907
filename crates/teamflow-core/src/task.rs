use crate::artifact::Artifact;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Opaque, caller-visible task identifier.
pub type TaskId = String;

/// Lifecycle status of a task.
///
/// Transitions are monotonic: `pending → processing → {completed | failed}`.
/// A task may also be failed straight from `pending` when it is rejected
/// before its pipeline starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, pipeline not started yet.
    Pending,
    /// Pipeline running.
    Processing,
    /// All steps finished.
    Completed,
    /// Pipeline aborted or the task was rejected.
    Failed,
}

impl TaskStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Processing => write!(f, "processing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Submission priority. Informational only; tasks are not reordered by it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Outcome status of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One agent step's outcome. Written once per step per task, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: String,
    pub status: StepStatus,
    pub payload: serde_json::Value,
    pub completed_at: DateTime<Utc>,
    /// True when `payload` is the step's configured default rather than real output.
    #[serde(default)]
    pub defaulted: bool,
    /// Failure reason, set for failed steps and for defaulted ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn completed(step: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            step: step.into(),
            status: StepStatus::Completed,
            payload,
            completed_at: Utc::now(),
            defaulted: false,
            error: None,
        }
    }

    /// A completed result carrying a substituted default payload.
    pub fn defaulted(
        step: impl Into<String>,
        payload: serde_json::Value,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            defaulted: true,
            error: Some(reason.into()),
            ..Self::completed(step, payload)
        }
    }

    pub fn failed(step: impl Into<String>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            step: step.into(),
            status: StepStatus::Failed,
            payload: serde_json::json!({ "error": reason }),
            completed_at: Utc::now(),
            defaulted: false,
            error: Some(reason),
        }
    }
}

/// Mutable state of one submitted task.
///
/// Mutated only by the pipeline executing it (through the registry); read by
/// any number of polling or streaming clients as cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub id: TaskId,
    pub user_id: String,
    pub request: String,
    pub team: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Step name → result. Keys are only ever added.
    pub results: HashMap<String, StepResult>,
    /// Step names in the order their results were recorded.
    pub progress: Vec<String>,
    /// Number of steps the pipeline is expected to run, once known.
    #[serde(default)]
    pub total_steps: usize,
    /// Reason the task failed.
    pub error: Option<String>,
    /// Compiled output of the pipeline, present once the task completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Incremented by every targeted update applied to `artifact`.
    #[serde(default)]
    pub artifact_revision: u32,
}

impl TaskState {
    pub fn new(
        user_id: impl Into<String>,
        request: impl Into<String>,
        team: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            request: request.into(),
            team: team.into(),
            priority,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            results: HashMap::new(),
            progress: Vec::new(),
            total_steps: 0,
            error: None,
            artifact: None,
            artifact_revision: 0,
        }
    }

    /// Fraction of expected steps that have a recorded result, in `[0, 1]`.
    pub fn progress_ratio(&self) -> f64 {
        if self.status == TaskStatus::Completed {
            return 1.0;
        }
        if self.total_steps == 0 {
            return 0.0;
        }
        (self.progress.len() as f64 / self.total_steps as f64).min(1.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = TaskState::new("u1", "Plan a trip", "travel_planning", Priority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.results.is_empty());
        assert!(task.started_at.is_none());
        assert_eq!(task.priority, Priority::High);
        assert!(!task.id.is_empty());
    }

    #[test]
    fn test_status_transitions() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Pending.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Completed));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&TaskStatus::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_defaulted_step_result() {
        let r = StepResult::defaulted(
            "destination_research",
            serde_json::json!({"summary": "research unavailable"}),
            "timeout",
        );
        assert_eq!(r.status, StepStatus::Completed);
        assert!(r.defaulted);
        assert_eq!(r.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_progress_ratio() {
        let mut task = TaskState::new("u1", "req", "blog_writing", Priority::Normal);
        assert_eq!(task.progress_ratio(), 0.0);
        task.total_steps = 4;
        task.progress.push("research".into());
        task.results.insert(
            "research".into(),
            StepResult::completed("research", serde_json::json!({})),
        );
        assert!((task.progress_ratio() - 0.25).abs() < f64::EPSILON);
    }
}
