use crate::broadcaster::ProgressBroadcaster;
use crate::persistence::{ProgressLog, ProgressLogEntry};
use crate::registry::TaskRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teamflow_agent::with_timeout;
use teamflow_core::{
    Artifact, ProgressEvent, StepResult, TaskId, TaskState, TaskStatus, TeamflowError,
    TeamflowResult,
};
use tracing::{error, info, warn};

/// Everything a step can see: the original request plus all prior payloads.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub task_id: TaskId,
    pub user_id: String,
    pub request: String,
    pub team: String,
    pub outputs: serde_json::Map<String, serde_json::Value>,
}

impl StepContext {
    pub fn from_task(task: &TaskState) -> Self {
        Self {
            task_id: task.id.clone(),
            user_id: task.user_id.clone(),
            request: task.request.clone(),
            team: task.team.clone(),
            outputs: serde_json::Map::new(),
        }
    }

    pub fn output(&self, step: &str) -> Option<&serde_json::Value> {
        self.outputs.get(step)
    }

    /// Textual view of a prior step's payload: its `text` or `summary`
    /// field when present, the raw JSON otherwise.
    pub fn output_text(&self, step: &str) -> Option<String> {
        let value = self.outputs.get(step)?;
        value["text"]
            .as_str()
            .or_else(|| value["summary"].as_str())
            .or_else(|| value.as_str())
            .map(str::to_string)
            .or_else(|| Some(value.to_string()))
    }

    /// Replace `{{request}}`, `{{team}}` and `{{<step>}}` placeholders.
    pub fn render(&self, template: &str) -> String {
        let mut rendered = template
            .replace("{{request}}", &self.request)
            .replace("{{team}}", &self.team);
        for name in self.outputs.keys() {
            let placeholder = format!("{{{{{name}}}}}");
            if rendered.contains(&placeholder) {
                let text = self.output_text(name).unwrap_or_default();
                rendered = rendered.replace(&placeholder, &text);
            }
        }
        rendered
    }
}

/// A unit of work in a team pipeline.
///
/// Steps may call external tools and may fail; the pipeline applies the
/// step's [`FailurePolicy`] when they do.
#[async_trait]
pub trait AgentStep: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> TeamflowResult<serde_json::Value>;
}

/// What the pipeline does when a step fails or times out.
#[derive(Debug, Clone, PartialEq)]
pub enum FailurePolicy {
    /// Stop the pipeline and fail the task.
    Abort,
    /// Record this payload as the step's result and keep going.
    ContinueWith(serde_json::Value),
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::ContinueWith(_) => write!(f, "continue with default"),
        }
    }
}

/// One configured step of a pipeline.
#[derive(Clone)]
pub struct PipelineStep {
    pub name: String,
    pub description: String,
    pub agent: Arc<dyn AgentStep>,
    pub policy: FailurePolicy,
    pub timeout: Duration,
}

impl PipelineStep {
    pub fn new(name: impl Into<String>, agent: Arc<dyn AgentStep>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            agent,
            policy: FailurePolicy::Abort,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn continue_with(mut self, default: serde_json::Value) -> Self {
        self.policy = FailurePolicy::ContinueWith(default);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a failure substitutes a default payload instead of aborting.
    pub fn continues_on_failure(&self) -> bool {
        matches!(self.policy, FailurePolicy::ContinueWith(_))
    }
}

/// An ordered list of steps run sequentially for one task.
#[derive(Clone, Default)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: PipelineStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names key the task's results, so they must be non-empty and
    /// unique within a pipeline.
    pub fn validate(&self) -> TeamflowResult<()> {
        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(TeamflowError::InvalidState(
                    "pipeline step without a name".to_string(),
                ));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(TeamflowError::InvalidState(format!(
                    "pipeline step '{}' appears more than once",
                    step.name
                )));
            }
        }
        Ok(())
    }
}

/// Runs pipelines against the registry, reporting every step to the broadcaster.
pub struct PipelineRunner {
    registry: Arc<TaskRegistry>,
    broadcaster: Arc<ProgressBroadcaster>,
    log: Arc<dyn ProgressLog>,
}

impl PipelineRunner {
    pub fn new(
        registry: Arc<TaskRegistry>,
        broadcaster: Arc<ProgressBroadcaster>,
        log: Arc<dyn ProgressLog>,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            log,
        }
    }

    /// Execute `pipeline` for a pending task.
    ///
    /// Each step sees the request plus all earlier payloads. After each step
    /// the result is written to the registry and then broadcast, so
    /// subscribers observe progress in step order. Returns the last step's
    /// payload. A task that is not `pending` is rejected untouched.
    pub async fn execute(
        &self,
        task_id: &str,
        pipeline: &Pipeline,
    ) -> TeamflowResult<serde_json::Value> {
        let task = self.registry.get(task_id)?;
        if task.status != TaskStatus::Pending {
            warn!(task_id = %task_id, status = %task.status, "Refusing to re-execute task");
            return Err(TeamflowError::InvalidState(format!(
                "task {task_id} is already {}",
                task.status
            )));
        }
        self.registry.mark_processing(task_id, pipeline.len())?;
        self.log.record(ProgressLogEntry::lifecycle(task_id, TaskStatus::Processing, None));

        match self.run_steps(&task, pipeline).await {
            Ok(last) => Ok(last),
            Err(e) => {
                // an aborted step has already finalized the task
                let open = self
                    .registry
                    .get(task_id)
                    .is_ok_and(|t| !t.status.is_terminal());
                if open {
                    error!(task_id = %task_id, error = %e, "Pipeline error, failing task");
                    self.fail(task_id, &e.to_string())?;
                }
                Err(e)
            }
        }
    }

    async fn run_steps(
        &self,
        task: &TaskState,
        pipeline: &Pipeline,
    ) -> TeamflowResult<serde_json::Value> {
        let task_id = task.id.as_str();
        pipeline.validate()?;

        let start = Instant::now();
        info!(task_id = %task_id, team = %task.team, steps = pipeline.len(), "Pipeline started");

        let mut ctx = StepContext::from_task(task);
        let mut last = serde_json::Value::Null;

        for step in pipeline.steps() {
            let step_start = Instant::now();
            let outcome = with_timeout(&step.name, step.timeout, step.agent.run(&ctx)).await;

            let result = match outcome {
                Ok(payload) => StepResult::completed(step.name.clone(), payload),
                Err(e) => match &step.policy {
                    FailurePolicy::ContinueWith(default) => {
                        warn!(
                            task_id = %task_id,
                            step = %step.name,
                            error = %e,
                            "Step failed, continuing with default"
                        );
                        StepResult::defaulted(step.name.clone(), default.clone(), e.to_string())
                    }
                    FailurePolicy::Abort => {
                        error!(task_id = %task_id, step = %step.name, error = %e, "Step failed, aborting pipeline");
                        let failed = StepResult::failed(step.name.clone(), e.to_string());
                        self.commit(task_id, failed)?;
                        let reason = format!("step '{}' failed: {e}", step.name);
                        self.fail(task_id, &reason)?;
                        return Err(TeamflowError::step(step.name.clone(), e.to_string()));
                    }
                },
            };

            info!(
                task_id = %task_id,
                step = %step.name,
                defaulted = result.defaulted,
                duration_ms = step_start.elapsed().as_millis() as u64,
                "Step completed"
            );
            ctx.outputs.insert(step.name.clone(), result.payload.clone());
            last = result.payload.clone();
            self.commit(task_id, result)?;
        }

        if let Ok(artifact) = Artifact::from_value(last.clone()) {
            self.registry.attach_artifact(task_id, artifact)?;
        }
        self.registry.finalize(task_id, TaskStatus::Completed, None)?;
        self.log.record(ProgressLogEntry::lifecycle(task_id, TaskStatus::Completed, None));
        self.broadcaster
            .publish(ProgressEvent::complete(task_id, last.clone()));
        self.broadcaster.close(task_id);

        info!(
            task_id = %task_id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Pipeline completed"
        );
        Ok(last)
    }

    /// Finalize a task as failed and tell its subscribers.
    pub fn fail(&self, task_id: &str, reason: &str) -> TeamflowResult<()> {
        self.registry
            .finalize(task_id, TaskStatus::Failed, Some(reason.to_string()))?;
        self.log.record(ProgressLogEntry::lifecycle(
            task_id,
            TaskStatus::Failed,
            Some(reason.to_string()),
        ));
        self.broadcaster.publish(ProgressEvent::error(task_id, reason));
        self.broadcaster.close(task_id);
        Ok(())
    }

    /// Registry write first, then notification.
    fn commit(&self, task_id: &str, result: StepResult) -> TeamflowResult<()> {
        self.log.record(ProgressLogEntry::step(task_id, &result));
        self.registry.record_step_result(task_id, result.clone())?;
        self.broadcaster.notify(task_id, &result);
        Ok(())
    }
}
