use crate::task::{StepResult, TaskId, TaskState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of progress event pushed to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A step finished (possibly with a substituted default).
    Progress,
    /// The task completed; payload carries the final result.
    Complete,
    /// The task failed; payload carries the error.
    Error,
}

/// Structured event delivered to every subscriber of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub task_id: TaskId,
    /// Absent on `complete` and `error` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_name: Option<String>,
    pub status: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// Event for a recorded step result.
    pub fn step(task_id: impl Into<TaskId>, result: &StepResult) -> Self {
        Self {
            kind: EventKind::Progress,
            task_id: task_id.into(),
            step_name: Some(result.step.clone()),
            status: result.status.to_string(),
            payload: result.payload.clone(),
            timestamp: result.completed_at,
        }
    }

    pub fn complete(task_id: impl Into<TaskId>, payload: serde_json::Value) -> Self {
        Self {
            kind: EventKind::Complete,
            task_id: task_id.into(),
            step_name: None,
            status: "completed".to_string(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn error(task_id: impl Into<TaskId>, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Error,
            task_id: task_id.into(),
            step_name: None,
            status: "failed".to_string(),
            payload: serde_json::json!({ "error": message.into() }),
            timestamp: Utc::now(),
        }
    }

    /// The terminal event for a finalized task, if it is finalized.
    pub fn terminal(state: &TaskState) -> Option<Self> {
        match state.status {
            crate::TaskStatus::Completed => Some(Self::complete(
                state.id.clone(),
                state
                    .artifact
                    .as_ref()
                    .map(crate::Artifact::to_value)
                    .unwrap_or(serde_json::Value::Null),
            )),
            crate::TaskStatus::Failed => Some(Self::error(
                state.id.clone(),
                state.error.clone().unwrap_or_else(|| "task failed".to_string()),
            )),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Complete | EventKind::Error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::task::{Priority, TaskStatus};

    #[test]
    fn test_event_wire_shape() {
        let result = StepResult::completed("initial_planning", serde_json::json!({"plan": "x"}));
        let event = ProgressEvent::step("t-1", &result);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["task_id"], "t-1");
        assert_eq!(json["step_name"], "initial_planning");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["payload"]["plan"], "x");
    }

    #[test]
    fn test_error_event_omits_step() {
        let event = ProgressEvent::error("t-2", "boom");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert!(json.get("step_name").is_none());
        assert!(event.is_terminal());
    }

    #[test]
    fn test_terminal_from_snapshot() {
        let mut state = TaskState::new("u", "req", "travel_planning", Priority::Normal);
        state.progress.push("initial_planning".to_string());
        state.results.insert(
            "initial_planning".to_string(),
            StepResult::completed("initial_planning", serde_json::json!({})),
        );
        state.status = TaskStatus::Processing;
        assert!(ProgressEvent::terminal(&state).is_none());

        state.status = TaskStatus::Failed;
        state.error = Some("compilation failed".into());
        let event = ProgressEvent::terminal(&state).unwrap();
        assert_eq!(event.kind, EventKind::Error);
        assert!(event.is_terminal());
    }
}
