use crate::broadcaster::ProgressBroadcaster;
use crate::dedup::{Claim, DeduplicationCache};
use crate::persistence::{NoopProgressLog, ProgressLog};
use crate::pipeline::{Pipeline, PipelineRunner};
use crate::registry::{RegistryConfig, TaskRegistry};
use crate::teams::TeamRouter;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use teamflow_agent::Toolbox;
use teamflow_core::{
    Artifact, Priority, TaskId, TaskState, TaskStatus, TeamflowError, TeamflowResult,
};
use teamflow_feedback::{ChangeRequest, FeedbackRouter, ScoringWeights, TargetedUpdater, UpdateOutcome};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Tunables for an [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub registry: RegistryConfig,
    /// How long identical submissions are treated as duplicates.
    pub dedup_ttl: Duration,
    /// Feedback classifier weights.
    pub scoring: ScoringWeights,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            dedup_ttl: Duration::from_secs(300),
            scoring: ScoringWeights::default(),
        }
    }
}

/// A task submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub user_id: String,
    /// Free-text request; also accepted as `request_text`.
    #[serde(alias = "request_text")]
    pub request: String,
    /// Routed by keyword when absent.
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

/// What a submitter gets back immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub team: String,
    /// Submission time plus the team's estimated duration.
    pub estimated_completion: DateTime<Utc>,
    /// True when an identical submission was already in flight or cached.
    pub duplicate: bool,
    /// Result of the earlier run, once it has completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_result: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackMode {
    Targeted,
    FullRewrite,
}

/// Outcome of [`Orchestrator::apply_feedback`].
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackResponse {
    pub task_id: TaskId,
    pub change_request: ChangeRequest,
    pub mode: FeedbackMode,
    /// False when a targeted update failed or lost a concurrent race.
    pub success: bool,
    pub message: String,
    pub elapsed_ms: u64,
    /// The task's artifact after this call (unchanged on failure).
    pub artifact: Option<Artifact>,
    /// Revision of `artifact`; bumped by each committed targeted update.
    pub artifact_revision: u32,
    /// Set when the feedback started a fresh pipeline run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_task_id: Option<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The coordination service: accepts requests, runs team pipelines in the
/// background and applies feedback to finished artifacts.
pub struct Orchestrator {
    registry: Arc<TaskRegistry>,
    broadcaster: Arc<ProgressBroadcaster>,
    dedup: Arc<DeduplicationCache>,
    teams: Arc<TeamRouter>,
    feedback: FeedbackRouter,
    updater: TargetedUpdater,
    log: Arc<dyn ProgressLog>,
}

impl Orchestrator {
    /// Orchestrator with the built-in teams wired to `toolbox`.
    pub fn new(toolbox: Toolbox, config: OrchestratorConfig) -> TeamflowResult<Self> {
        let teams = TeamRouter::builtin(toolbox.clone());
        Self::with_teams(toolbox, teams, config)
    }

    pub fn with_teams(
        toolbox: Toolbox,
        teams: TeamRouter,
        config: OrchestratorConfig,
    ) -> TeamflowResult<Self> {
        Ok(Self {
            registry: Arc::new(TaskRegistry::new(config.registry)),
            broadcaster: Arc::new(ProgressBroadcaster::new()),
            dedup: Arc::new(DeduplicationCache::new(config.dedup_ttl)),
            teams: Arc::new(teams),
            feedback: FeedbackRouter::new(config.scoring)?,
            updater: TargetedUpdater::new(toolbox),
            log: Arc::new(NoopProgressLog),
        })
    }

    pub fn with_progress_log(mut self, log: Arc<dyn ProgressLog>) -> Self {
        self.log = log;
        self
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    pub fn dedup(&self) -> &Arc<DeduplicationCache> {
        &self.dedup
    }

    pub fn teams(&self) -> &TeamRouter {
        &self.teams
    }

    pub fn feedback_router(&self) -> &FeedbackRouter {
        &self.feedback
    }

    fn runner(&self) -> Arc<PipelineRunner> {
        Arc::new(PipelineRunner::new(
            self.registry.clone(),
            self.broadcaster.clone(),
            self.log.clone(),
        ))
    }

    /// Accept a request and schedule its pipeline. Returns without waiting for
    /// any step to run.
    ///
    /// An identical `(team, request)` seen within the dedup window returns the
    /// earlier task instead of starting a second run.
    pub async fn submit(&self, submit: SubmitRequest) -> TeamflowResult<Submission> {
        let request = submit.request.trim().to_string();
        if request.is_empty() {
            return Err(TeamflowError::InvalidState(
                "request text is empty".to_string(),
            ));
        }
        let team_name = match submit.team {
            Some(team) => team,
            None => self.teams.route(&request).to_string(),
        };
        let team = self.teams.get(&team_name).ok_or_else(|| {
            TeamflowError::InvalidState(format!(
                "unknown team '{team_name}', expected one of {:?}",
                self.teams.names()
            ))
        })?;

        let state = TaskState::new(submit.user_id, request.clone(), team_name.clone(), submit.priority);
        let task_id = state.id.clone();
        let estimated_completion = chrono::Duration::from_std(team.estimated_duration)
            .ok()
            .and_then(|eta| state.created_at.checked_add_signed(eta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let placeholder = serde_json::json!({ "task_id": task_id });
        if let Claim::Duplicate(cached) = self.dedup.claim(&request, &team_name, placeholder) {
            return Ok(self.duplicate_submission(&team_name, cached, estimated_completion));
        }

        self.registry.insert(state);
        let pipeline = team.pipeline.clone();
        self.spawn_supervised(task_id.clone(), request, team_name.clone(), pipeline);

        Ok(Submission {
            task_id,
            status: TaskStatus::Pending,
            team: team_name,
            estimated_completion,
            duplicate: false,
            cached_result: None,
        })
    }

    fn duplicate_submission(
        &self,
        team: &str,
        cached: serde_json::Value,
        fallback_eta: DateTime<Utc>,
    ) -> Submission {
        let task_id = cached["task_id"].as_str().unwrap_or_default().to_string();
        let existing = self.registry.get(&task_id).ok();
        let status = existing.as_ref().map_or_else(
            || {
                if cached.get("result").is_some() {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Pending
                }
            },
            |t| t.status,
        );
        let estimated_completion = existing
            .as_ref()
            .and_then(|t| t.completed_at)
            .unwrap_or(fallback_eta);
        info!(task_id = %task_id, team = %team, status = %status, "Duplicate submission short-circuited");
        Submission {
            task_id,
            status,
            team: team.to_string(),
            estimated_completion,
            duplicate: true,
            cached_result: cached.get("result").cloned(),
        }
    }

    /// Run the pipeline detached, with a supervisor that makes sure the task
    /// always reaches a terminal state, even if the pipeline task panics.
    fn spawn_supervised(
        &self,
        task_id: TaskId,
        request: String,
        team: String,
        pipeline: Pipeline,
    ) {
        let runner = self.runner();
        let registry = self.registry.clone();
        let dedup = self.dedup.clone();

        let worker = {
            let runner = runner.clone();
            let task_id = task_id.clone();
            tokio::spawn(async move { runner.execute(&task_id, &pipeline).await })
        };

        tokio::spawn(async move {
            let failure = match worker.await {
                Ok(Ok(result)) => {
                    dedup.remember(
                        &request,
                        &team,
                        serde_json::json!({ "task_id": task_id, "result": result }),
                    );
                    None
                }
                Ok(Err(e)) => Some(e.to_string()),
                Err(join_error) => {
                    error!(task_id = %task_id, error = %join_error, "Pipeline task died");
                    Some(format!("pipeline task died: {join_error}"))
                }
            };

            let Some(reason) = failure else {
                return;
            };
            dedup.forget(&request, &team);
            let finished = registry
                .get(&task_id)
                .map(|t| t.status.is_terminal())
                .unwrap_or(true);
            if !finished {
                if let Err(e) = runner.fail(&task_id, &reason) {
                    error!(task_id = %task_id, error = %e, "Could not record pipeline failure");
                }
            }
        });
    }

    /// Snapshot of a task.
    pub fn status(&self, task_id: &str) -> TeamflowResult<TaskState> {
        self.registry.get(task_id)
    }

    /// Classify `instruction` and apply it to the task's artifact.
    ///
    /// Targeted changes are all-or-nothing. Full rewrites, and feedback the
    /// classifier is unsure about, start a new task with the feedback folded
    /// into the original request.
    pub async fn apply_feedback(
        &self,
        task_id: &str,
        instruction: &str,
    ) -> TeamflowResult<FeedbackResponse> {
        let start = Instant::now();
        let task = self.registry.get(task_id)?;
        if task.status != TaskStatus::Completed {
            return Err(TeamflowError::InvalidState(format!(
                "task {task_id} is {}; feedback needs a completed task",
                task.status
            )));
        }
        let artifact = task.artifact.clone().ok_or_else(|| {
            TeamflowError::InvalidState(format!("task {task_id} has no artifact to revise"))
        })?;

        let mut change = self.feedback.classify(instruction);
        info!(
            task_id = %task_id,
            change_type = %change.change_type,
            confidence = change.confidence,
            low_confidence = change.low_confidence,
            "Feedback classified"
        );

        if change.needs_full_rewrite() {
            if let Some(team) = self.teams.get(&task.team) {
                change.required_steps = team.pipeline.step_names();
            }
            let submission = self
                .submit(SubmitRequest {
                    user_id: task.user_id.clone(),
                    request: format!("{}\n\nRevision feedback: {instruction}", task.request),
                    team: Some(task.team.clone()),
                    priority: task.priority,
                })
                .await?;
            return Ok(FeedbackResponse {
                task_id: task_id.to_string(),
                change_request: change,
                mode: FeedbackMode::FullRewrite,
                success: true,
                message: format!(
                    "Feedback needs a full rewrite; started task {}",
                    submission.task_id
                ),
                elapsed_ms: start.elapsed().as_millis() as u64,
                artifact: Some(artifact),
                artifact_revision: task.artifact_revision,
                rewrite_task_id: Some(submission.task_id),
                error: None,
            });
        }

        let outcome = self.updater.apply(&change, &artifact).await;
        let response = match outcome {
            UpdateOutcome::Updated {
                artifact: updated,
                message,
                elapsed_ms,
                ..
            } => {
                match self
                    .registry
                    .replace_artifact_if(task_id, task.artifact_revision, updated.clone())
                {
                    Ok(revision) => FeedbackResponse {
                        task_id: task_id.to_string(),
                        change_request: change,
                        mode: FeedbackMode::Targeted,
                        success: true,
                        message,
                        elapsed_ms,
                        artifact: Some(updated),
                        artifact_revision: revision,
                        rewrite_task_id: None,
                        error: None,
                    },
                    Err(e) => {
                        warn!(task_id = %task_id, error = %e, "Targeted update lost a race");
                        FeedbackResponse {
                            task_id: task_id.to_string(),
                            change_request: change,
                            mode: FeedbackMode::Targeted,
                            success: false,
                            message: "Artifact changed while the update was running".to_string(),
                            elapsed_ms,
                            artifact: Some(artifact),
                            artifact_revision: task.artifact_revision,
                            rewrite_task_id: None,
                            error: Some(e.to_string()),
                        }
                    }
                }
            }
            UpdateOutcome::Failed {
                error, elapsed_ms, ..
            } => FeedbackResponse {
                task_id: task_id.to_string(),
                change_request: change,
                mode: FeedbackMode::Targeted,
                success: false,
                message: "Update failed; the artifact was left unchanged".to_string(),
                elapsed_ms,
                artifact: Some(artifact),
                artifact_revision: task.artifact_revision,
                rewrite_task_id: None,
                error: Some(error),
            },
        };
        Ok(response)
    }

    /// Periodically sweep the registry and purge expired dedup entries.
    pub fn spawn_maintenance(&self, every: Duration) -> JoinHandle<()> {
        let registry = self.registry.clone();
        let dedup = self.dedup.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = registry.sweep(Utc::now());
                let purged = dedup.purge_expired();
                if evicted > 0 || purged > 0 {
                    info!(evicted, purged, "Maintenance sweep");
                }
            }
        })
    }
}
