use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use teamflow_core::{
    Artifact, Priority, StepResult, TaskId, TaskState, TaskStatus, TeamflowError, TeamflowResult,
};
use tracing::{info, warn};

/// Retention policy for finished tasks.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Terminal tasks older than this are evicted by [`TaskRegistry::sweep`].
    pub retention: Duration,
    /// Upper bound on tracked tasks; the oldest terminal tasks go first.
    pub max_tasks: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(3600),
            max_tasks: 10_000,
        }
    }
}

/// Counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Counts per status.
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// All tracked tasks.
    pub total: usize,
}

type Slot = Arc<RwLock<TaskState>>;

/// Process-wide map from task id to task state.
///
/// Each task sits behind its own lock, so a pipeline writing one task never
/// blocks readers of another. Readers always get a cloned snapshot, which
/// means a step record is either absent or fully present.
pub struct TaskRegistry {
    tasks: RwLock<HashMap<TaskId, Slot>>,
    config: RegistryConfig,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Create a `pending` task and return its id. Does not start any work.
    pub fn create(
        &self,
        user_id: impl Into<String>,
        request: impl Into<String>,
        team: impl Into<String>,
        priority: Priority,
    ) -> TaskId {
        self.insert(TaskState::new(user_id, request, team, priority))
    }

    /// Track a freshly built state. The state must still be `pending`.
    pub fn insert(&self, state: TaskState) -> TaskId {
        let id = state.id.clone();
        info!(task_id = %id, team = %state.team, user_id = %state.user_id, "Task created");
        self.tasks
            .write()
            .insert(id.clone(), Arc::new(RwLock::new(state)));
        id
    }

    /// Snapshot of a task.
    pub fn get(&self, task_id: &str) -> TeamflowResult<TaskState> {
        Ok(self.slot(task_id)?.read().clone())
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tasks.read().contains_key(task_id)
    }

    /// Move a task from `pending` to `processing`.
    pub fn mark_processing(&self, task_id: &str, total_steps: usize) -> TeamflowResult<()> {
        let slot = self.slot(task_id)?;
        let mut task = slot.write();
        if !task.status.can_transition_to(TaskStatus::Processing) {
            warn!(task_id = %task_id, status = %task.status, "Rejected start of non-pending task");
            return Err(TeamflowError::InvalidState(format!(
                "task {task_id} is {} and cannot start",
                task.status
            )));
        }
        task.status = TaskStatus::Processing;
        task.started_at = Some(Utc::now());
        task.total_steps = total_steps;
        Ok(())
    }

    /// Append one step's result. Only allowed while the task is `processing`,
    /// and only once per step name.
    pub fn record_step_result(&self, task_id: &str, result: StepResult) -> TeamflowResult<()> {
        let slot = self.slot(task_id)?;
        let mut task = slot.write();
        if task.status != TaskStatus::Processing {
            warn!(
                task_id = %task_id,
                step = %result.step,
                status = %task.status,
                "Rejected step result for task that is not processing"
            );
            return Err(TeamflowError::InvalidState(format!(
                "cannot record step '{}' on {} task {task_id}",
                result.step, task.status
            )));
        }
        if task.results.contains_key(&result.step) {
            warn!(task_id = %task_id, step = %result.step, "Rejected duplicate step result");
            return Err(TeamflowError::InvalidState(format!(
                "step '{}' already recorded for task {task_id}",
                result.step
            )));
        }
        task.progress.push(result.step.clone());
        task.results.insert(result.step.clone(), result);
        Ok(())
    }

    /// Store the compiled output of a task that is still running.
    pub fn attach_artifact(&self, task_id: &str, artifact: Artifact) -> TeamflowResult<()> {
        let slot = self.slot(task_id)?;
        let mut task = slot.write();
        if task.status != TaskStatus::Processing {
            return Err(TeamflowError::InvalidState(format!(
                "cannot attach artifact to {} task {task_id}",
                task.status
            )));
        }
        task.artifact = Some(artifact);
        Ok(())
    }

    /// Swap in a revised artifact for a completed task. Returns the new revision.
    pub fn replace_artifact(&self, task_id: &str, artifact: Artifact) -> TeamflowResult<u32> {
        let slot = self.slot(task_id)?;
        let mut task = slot.write();
        if task.status != TaskStatus::Completed {
            return Err(TeamflowError::InvalidState(format!(
                "cannot revise artifact of {} task {task_id}",
                task.status
            )));
        }
        task.artifact = Some(artifact);
        task.artifact_revision += 1;
        Ok(task.artifact_revision)
    }

    /// Like [`replace_artifact`](Self::replace_artifact), but only if nobody
    /// revised the artifact since `expected` was read.
    pub fn replace_artifact_if(
        &self,
        task_id: &str,
        expected: u32,
        artifact: Artifact,
    ) -> TeamflowResult<u32> {
        let slot = self.slot(task_id)?;
        let mut task = slot.write();
        if task.artifact_revision != expected {
            warn!(
                task_id = %task_id,
                expected,
                actual = task.artifact_revision,
                "Rejected stale artifact revision"
            );
            return Err(TeamflowError::InvalidState(format!(
                "artifact of task {task_id} is at revision {}, expected {expected}",
                task.artifact_revision
            )));
        }
        if task.status != TaskStatus::Completed {
            return Err(TeamflowError::InvalidState(format!(
                "cannot revise artifact of {} task {task_id}",
                task.status
            )));
        }
        task.artifact = Some(artifact);
        task.artifact_revision += 1;
        Ok(task.artifact_revision)
    }

    /// Terminal write. After this no step results are accepted for the task.
    pub fn finalize(
        &self,
        task_id: &str,
        status: TaskStatus,
        error: Option<String>,
    ) -> TeamflowResult<()> {
        if !status.is_terminal() {
            return Err(TeamflowError::InvalidState(format!(
                "finalize needs a terminal status, got {status}"
            )));
        }
        let slot = self.slot(task_id)?;
        let mut task = slot.write();
        if !task.status.can_transition_to(status) {
            warn!(
                task_id = %task_id,
                from = %task.status,
                to = %status,
                "Rejected finalize"
            );
            return Err(TeamflowError::InvalidState(format!(
                "task {task_id} cannot go from {} to {status}",
                task.status
            )));
        }
        task.status = status;
        task.completed_at = Some(Utc::now());
        task.error = error;
        info!(task_id = %task_id, status = %status, "Task finalized");
        Ok(())
    }

    /// Snapshots of all tasks (optionally for one user), oldest first.
    pub fn list(&self, user_id: Option<&str>) -> Vec<TaskState> {
        let slots: Vec<Slot> = self.tasks.read().values().cloned().collect();
        let mut tasks: Vec<TaskState> = slots
            .iter()
            .map(|s| s.read().clone())
            .filter(|t| user_id.map_or(true, |u| t.user_id == u))
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn stats(&self) -> RegistryStats {
        let slots: Vec<Slot> = self.tasks.read().values().cloned().collect();
        let mut stats = RegistryStats {
            total: slots.len(),
            ..RegistryStats::default()
        };
        for slot in &slots {
            match slot.read().status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.read().is_empty()
    }

    /// Evict finished tasks past retention, then the oldest finished tasks
    /// until the registry fits `max_tasks`. Live tasks are never evicted.
    ///
    /// Returns the number of evicted tasks.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::days(365 * 100));

        let mut tasks = self.tasks.write();
        let before = tasks.len();

        let mut finished: Vec<(TaskId, DateTime<Utc>)> = tasks
            .iter()
            .filter_map(|(id, slot)| {
                let task = slot.read();
                if task.status.is_terminal() {
                    Some((id.clone(), task.completed_at.unwrap_or(task.created_at)))
                } else {
                    None
                }
            })
            .collect();
        finished.sort_by_key(|(_, at)| *at);

        let mut kept = Vec::with_capacity(finished.len());
        for (id, at) in finished {
            // an expiry past the representable range never comes
            let expired = at.checked_add_signed(retention).is_some_and(|expiry| expiry < now);
            if expired {
                tasks.remove(&id);
            } else {
                kept.push(id);
            }
        }

        let mut oldest = kept.into_iter();
        while tasks.len() > self.config.max_tasks {
            match oldest.next() {
                Some(id) => {
                    tasks.remove(&id);
                }
                None => break,
            }
        }

        let evicted = before - tasks.len();
        if evicted > 0 {
            info!(evicted, remaining = tasks.len(), "Registry sweep");
        }
        evicted
    }

    fn slot(&self, task_id: &str) -> TeamflowResult<Slot> {
        self.tasks
            .read()
            .get(task_id)
            .cloned()
            .ok_or_else(|| TeamflowError::TaskNotFound(task_id.to_string()))
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
