#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end orchestration with mocked collaborators.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use teamflow_agent::{
    GeneratedImage, ImageGenerator, SearchHit, SearchProvider, TextGenerator, Toolbox,
};
use teamflow_core::{
    fields, EventKind, Priority, StepStatus, TaskState, TaskStatus, TeamflowError, TeamflowResult,
};
use teamflow_orchestrator::{
    AgentStep, FeedbackMode, Orchestrator, OrchestratorConfig, Pipeline, PipelineStep,
    StepContext, SubmitRequest, TeamDefinition, TeamRouter,
};
use tokio::sync::Semaphore;

const GUIDE: &str = "# Madinah Travel Guide\n\nMadinah rewards slow travel.\n\n## Week one\n\nVisit the Prophet's Mosque and Quba.\n\nLeave room for quiet evenings.";

struct Writer {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TextGenerator for Writer {
    async fn complete(&self, _system: Option<&str>, _prompt: &str) -> TeamflowResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(GUIDE.to_string())
    }
}

struct Search;

#[async_trait]
impl SearchProvider for Search {
    async fn search(&self, query: &str) -> TeamflowResult<Vec<SearchHit>> {
        Ok(vec![SearchHit {
            title: "Prophet's Mosque".into(),
            url: "https://example.org/masjid".into(),
            snippet: format!("result for {query}"),
        }])
    }
}

struct SearchDown;

#[async_trait]
impl SearchProvider for SearchDown {
    async fn search(&self, _query: &str) -> TeamflowResult<Vec<SearchHit>> {
        Err(TeamflowError::Http("search API returned 503".into()))
    }
}

struct Images;

#[async_trait]
impl ImageGenerator for Images {
    async fn generate(&self, prompt: &str) -> TeamflowResult<GeneratedImage> {
        Ok(GeneratedImage {
            url: "https://img.example/1.png".into(),
            alt: prompt.chars().take(40).collect(),
        })
    }
}

fn toolbox(calls: Arc<AtomicUsize>, search: Arc<dyn SearchProvider>) -> Toolbox {
    Toolbox::new(Arc::new(Writer { calls }), Arc::new(Images), search)
}

fn travel(request: &str) -> SubmitRequest {
    SubmitRequest {
        user_id: "user-1".into(),
        request: request.into(),
        team: Some("travel_planning".into()),
        priority: Priority::High,
    }
}

async fn wait_terminal(o: &Orchestrator, id: &str) -> TaskState {
    for _ in 0..500 {
        let task = o.status(id).unwrap();
        if task.status.is_terminal() {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} did not finish");
}

fn rank(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Pending => 0,
        TaskStatus::Processing => 1,
        TaskStatus::Completed | TaskStatus::Failed => 2,
    }
}

#[tokio::test]
async fn test_travel_pipeline_records_every_step() {
    let calls = Arc::new(AtomicUsize::new(0));
    let o = Orchestrator::new(toolbox(calls, Arc::new(Search)), OrchestratorConfig::default())
        .unwrap();

    let submission = o
        .submit(travel("Plan a trip to Madinah for 14 days"))
        .await
        .unwrap();
    assert_eq!(submission.status, TaskStatus::Pending);
    assert!(!submission.duplicate);

    let mut seen = vec![];
    let task = loop {
        let task = o.status(&submission.task_id).unwrap();
        seen.push(task.status);
        if task.status.is_terminal() {
            break task;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    };
    assert!(seen.windows(2).all(|w| rank(w[0]) <= rank(w[1])), "{seen:?}");

    assert_eq!(task.status, TaskStatus::Completed);
    for step in [
        "initial_planning",
        "destination_research",
        "real_time_search",
        "final_compilation",
    ] {
        let result = &task.results[step];
        assert_eq!(result.status, StepStatus::Completed, "{step}");
        assert!(!result.defaulted, "{step}");
    }
    assert_eq!(task.progress.len(), 4);
    let artifact = task.artifact.unwrap();
    assert_eq!(artifact.get_str(fields::TITLE), Some("Madinah Travel Guide"));
    assert!(artifact.rendered_contains("<h1>Madinah Travel Guide</h1>"));
}

#[tokio::test]
async fn test_duplicate_submission_runs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let o = Orchestrator::new(
        toolbox(calls.clone(), Arc::new(Search)),
        OrchestratorConfig::default(),
    )
    .unwrap();

    let first = o.submit(travel("Plan a trip to Madinah for 14 days")).await.unwrap();
    let second = o
        .submit(travel("  plan a trip to madinah for 14 days "))
        .await
        .unwrap();
    assert!(second.duplicate);
    assert_eq!(second.task_id, first.task_id);
    assert!(o.dedup().is_duplicate("Plan a trip to Madinah for 14 days", "travel_planning"));

    wait_terminal(&o, &first.task_id).await;
    assert_eq!(o.registry().len(), 1);
    // initial_planning + final_compilation
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // the supervisor caches the result just after the task finalizes
    for _ in 0..100 {
        let cached = o.dedup().lookup("Plan a trip to Madinah for 14 days", "travel_planning");
        if cached.is_some_and(|c| c.get("result").is_some()) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let third = o.submit(travel("Plan a trip to Madinah for 14 days")).await.unwrap();
    assert!(third.duplicate);
    assert_eq!(third.status, TaskStatus::Completed);
    assert_eq!(third.cached_result.unwrap()["title"], "Madinah Travel Guide");
}

#[tokio::test]
async fn test_title_feedback_updates_artifact() {
    let calls = Arc::new(AtomicUsize::new(0));
    let o = Orchestrator::new(toolbox(calls, Arc::new(Search)), OrchestratorConfig::default())
        .unwrap();
    let submission = o.submit(travel("Plan a trip to Madinah")).await.unwrap();
    let before = wait_terminal(&o, &submission.task_id).await.artifact.unwrap();

    let response = o
        .apply_feedback(&submission.task_id, "change the title to: Top 10 Hidden Gems")
        .await
        .unwrap();
    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.mode, FeedbackMode::Targeted);
    assert_eq!(response.change_request.change_type.as_str(), "title_only");
    assert!(response.change_request.confidence >= 0.3);
    assert_eq!(response.artifact_revision, 1);

    let task = o.status(&submission.task_id).unwrap();
    let after = task.artifact.unwrap();
    assert_eq!(after.get_str(fields::TITLE), Some("Top 10 Hidden Gems"));
    assert!(after.rendered_contains("<h1>Top 10 Hidden Gems</h1>"));
    assert!(!after.rendered_contains("<h1>Madinah Travel Guide</h1>"));
    for field in [fields::INTRODUCTION, fields::CONCLUSION, fields::META_DESCRIPTION] {
        assert_eq!(after.get(field), before.get(field), "{field}");
    }
    // step results are history and never rewritten
    assert_eq!(task.results.len(), 4);
}

#[tokio::test]
async fn test_failing_search_continues_with_defaults() {
    let calls = Arc::new(AtomicUsize::new(0));
    let o = Orchestrator::new(
        toolbox(calls, Arc::new(SearchDown)),
        OrchestratorConfig::default(),
    )
    .unwrap();
    let submission = o.submit(travel("Plan a trip to Madinah")).await.unwrap();
    let task = wait_terminal(&o, &submission.task_id).await;

    assert_eq!(task.status, TaskStatus::Completed);
    let research = &task.results["destination_research"];
    assert_eq!(research.status, StepStatus::Completed);
    assert!(research.defaulted);
    assert_eq!(research.payload["summary"], "research unavailable");
    assert!(research.error.as_ref().unwrap().contains("503"));
    assert!(task.results["real_time_search"].defaulted);
    assert!(!task.results["final_compilation"].defaulted);
}

/// Waits for a permit before producing its payload.
struct Gated {
    name: &'static str,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl AgentStep for Gated {
    async fn run(&self, _ctx: &StepContext) -> TeamflowResult<serde_json::Value> {
        self.gate
            .acquire()
            .await
            .map_err(|e| TeamflowError::step(self.name, e.to_string()))?
            .forget();
        Ok(json!({ "step": self.name }))
    }
}

#[tokio::test]
async fn test_late_subscriber_sees_only_new_steps() {
    let open = Arc::new(Semaphore::new(2));
    let gate = Arc::new(Semaphore::new(0));
    let step = |name: &'static str, sem: &Arc<Semaphore>| {
        PipelineStep::new(name, Arc::new(Gated { name, gate: sem.clone() }))
    };
    let pipeline = Pipeline::new()
        .step(step("step_1", &open))
        .step(step("step_2", &open))
        .step(step("step_3", &gate))
        .step(step("step_4", &gate));
    let teams = TeamRouter::new(
        vec![TeamDefinition {
            name: "gated".into(),
            display_name: "Gated".into(),
            description: String::new(),
            keywords: vec![],
            estimated_duration: Duration::from_secs(1),
            pipeline,
        }],
        "gated",
    );
    let o = Orchestrator::with_teams(Toolbox::unconfigured(), teams, OrchestratorConfig::default())
        .unwrap();

    let submission = o
        .submit(SubmitRequest {
            user_id: "u".into(),
            request: "anything".into(),
            team: None,
            priority: Priority::Normal,
        })
        .await
        .unwrap();
    let id = submission.task_id;

    for _ in 0..500 {
        if o.status(&id).unwrap().progress.len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let mut sub = o.broadcaster().subscribe(&id);
    gate.add_permits(2);

    let third = sub.recv().await.unwrap();
    assert_eq!(third.kind, EventKind::Progress);
    assert_eq!(third.step_name.as_deref(), Some("step_3"));
    assert_eq!(sub.recv().await.unwrap().step_name.as_deref(), Some("step_4"));
    assert_eq!(sub.recv().await.unwrap().kind, EventKind::Complete);
    assert!(sub.recv().await.is_none());

    // missed steps come from the registry
    let task = o.status(&id).unwrap();
    assert_eq!(task.progress, vec!["step_1", "step_2", "step_3", "step_4"]);
    assert_eq!(task.results["step_1"].payload["step"], "step_1");
}

#[tokio::test]
async fn test_unsubscribe_does_not_affect_pipeline() {
    let calls = Arc::new(AtomicUsize::new(0));
    let o = Orchestrator::new(toolbox(calls, Arc::new(Search)), OrchestratorConfig::default())
        .unwrap();
    let submission = o.submit(travel("Plan a trip to Madinah")).await.unwrap();

    let dropped = o.broadcaster().subscribe(&submission.task_id);
    let mut kept = o.broadcaster().subscribe(&submission.task_id);
    o.broadcaster().unsubscribe(&dropped);
    drop(dropped);

    let mut steps = vec![];
    while let Some(event) = kept.recv().await {
        if let Some(step) = event.step_name {
            steps.push(step);
        }
    }
    assert_eq!(
        steps,
        vec![
            "initial_planning",
            "destination_research",
            "real_time_search",
            "final_compilation"
        ]
    );
    assert_eq!(
        wait_terminal(&o, &submission.task_id).await.status,
        TaskStatus::Completed
    );
}
