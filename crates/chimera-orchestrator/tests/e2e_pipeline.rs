#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end pipeline tests.
//!
//! Drives planner → queue → worker → judge → {publisher gate | HITL} with
//! mock collaborators and a manual clock, one step at a time.

use async_trait::async_trait;
use chimera_agent::{
    ContentScorer, GenerationBackend, GenerationRequest, GenerationResponse, RetryPolicy,
    ScoreRequest,
};
use chimera_channels::{
    InboxSignalSource, Mention, PlatformPublisher, PublishRequest, PublishResponse, SignalSource,
    Signals, Trend, RATE_LIMIT_EXCEEDED,
};
use chimera_core::{
    AgentTask, Article, ChimeraError, ChimeraResult, Clock, ComponentScores, Decision, HumanDecision,
    ManualClock, Platform, Priority, RejectionReason, ScoreComponent, TaskPayload, TaskResult,
    TaskStatus, ValidationResult,
};
use chimera_orchestrator::*;
use chimera_security::AuditLog;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

/// Answers with a fixed draft, or fails every call when told to.
#[derive(Default)]
struct ScriptedBackend {
    fallback_error: Mutex<Option<fn() -> ChimeraError>>,
    calls: AtomicU32,
    last_request: Mutex<Option<GenerationRequest>>,
    panic_next: AtomicBool,
}

impl ScriptedBackend {
    fn failing_with(make: fn() -> ChimeraError) -> Self {
        let backend = Self::default();
        *backend.fallback_error.lock() = Some(make);
        backend
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> ChimeraResult<GenerationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("generation backend crashed");
        }
        if let Some(make) = *self.fallback_error.lock() {
            return Err(make());
        }
        Ok(GenerationResponse {
            content: "Rust ships another release".into(),
            confidence_self_assessment: Some(0.8),
        })
    }
}

/// Returns the same scores for everything, or fails every call.
struct FixedScorer {
    scores: Mutex<Option<ComponentScores>>,
    calls: AtomicU32,
    panic_next: AtomicBool,
}

impl FixedScorer {
    fn new(scores: ComponentScores) -> Self {
        Self {
            scores: Mutex::new(Some(scores)),
            calls: AtomicU32::new(0),
            panic_next: AtomicBool::new(false),
        }
    }

    fn approving() -> Self {
        Self::new(ComponentScores::new(0.9, 1.0, 1.0, 0.8))
    }

    fn escalating() -> Self {
        Self::new(ComponentScores::new(0.7, 0.7, 0.7, 0.7))
    }

    fn unavailable() -> Self {
        Self {
            scores: Mutex::new(None),
            calls: AtomicU32::new(0),
            panic_next: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ContentScorer for FixedScorer {
    async fn score(&self, _request: &ScoreRequest) -> ChimeraResult<ComponentScores> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_next.swap(false, Ordering::SeqCst) {
            panic!("scorer crashed");
        }
        (*self.scores.lock()).ok_or_else(|| ChimeraError::TransientBackend("scorer down".into()))
    }
}

/// Records every request and answers from a script, defaulting to success.
#[derive(Default)]
struct RecordingPublisher {
    requests: Mutex<Vec<PublishRequest>>,
    responses: Mutex<VecDeque<PublishResponse>>,
}

impl RecordingPublisher {
    fn calls(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl PlatformPublisher for RecordingPublisher {
    fn name(&self) -> &str {
        "recording"
    }

    async fn publish(&self, request: &PublishRequest) -> ChimeraResult<PublishResponse> {
        let mut requests = self.requests.lock();
        requests.push(request.clone());
        let n = requests.len();
        Ok(self
            .responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| PublishResponse::published(format!("post-{n}"))))
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct Harness {
    swarm: Swarm,
    clock: ManualClock,
    backend: Arc<ScriptedBackend>,
    scorer: Arc<FixedScorer>,
    publisher: Arc<RecordingPublisher>,
    inbox: Arc<InboxSignalSource>,
}

fn test_config() -> SwarmConfig {
    SwarmConfig {
        agent_id: "nova".into(),
        goals: vec!["grow the rust audience".into()],
        retry: RetryPolicy::immediate(3),
        ..SwarmConfig::default()
    }
}

fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
}

fn harness_with(
    config: SwarmConfig,
    backend: ScriptedBackend,
    scorer: FixedScorer,
    state: Option<Arc<dyn StateBackend>>,
) -> Harness {
    let clock = ManualClock::new(start_time());
    let backend = Arc::new(backend);
    let scorer = Arc::new(scorer);
    let publisher = Arc::new(RecordingPublisher::default());
    let inbox = Arc::new(InboxSignalSource::new());
    let mut collaborators = Collaborators::new(
        backend.clone(),
        scorer.clone(),
        publisher.clone(),
        inbox.clone(),
    );
    if let Some(state) = state {
        collaborators = collaborators.with_state_backend(state);
    }
    let swarm = Swarm::with_clock(
        config,
        collaborators,
        Arc::new(AuditLog::disabled("nova")),
        clock.shared(),
    )
    .unwrap();
    Harness {
        swarm,
        clock,
        backend,
        scorer,
        publisher,
        inbox,
    }
}

fn harness(scorer: FixedScorer) -> Harness {
    harness_with(test_config(), ScriptedBackend::default(), scorer, None)
}

fn post_task(h: &Harness, platform: Platform) -> AgentTask {
    AgentTask::new_at(
        TaskPayload::GeneratePost {
            topic: "rust 2024 edition".into(),
            platform,
            context_hint: None,
        },
        Priority::High,
        h.clock.now(),
        ChronoDuration::hours(1),
    )
}

impl Harness {
    /// Enqueue a post, run one worker step and hand its result to the judge.
    async fn run_post(&self, platform: Platform) -> Dispatched {
        self.swarm.queue().enqueue(post_task(self, platform)).unwrap();
        let lease = self.swarm.queue().try_dequeue().unwrap();
        let result = self.swarm.worker().process(lease).await;
        assert_eq!(result.status, TaskStatus::Success);
        let reviewed = self.swarm.review().pop(Duration::from_millis(50)).await.unwrap();
        assert_eq!(reviewed.id, result.id);
        self.swarm.judge().dispatch(reviewed).await.unwrap()
    }
}

// ---------------------------------------------------------------------------
// Approve → publish
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_approved_draft_is_published_and_remembered() {
    let h = harness(FixedScorer::approving());

    let dispatched = h.run_post(Platform::X).await;
    assert_eq!(dispatched.validation.decision, Decision::Approve);
    assert_eq!(
        dispatched.publish,
        Some(PublishOutcome::Published {
            post_id: Some("post-1".into())
        })
    );
    assert_eq!(h.publisher.calls(), 1);
    assert!(!h.publisher.requests.lock()[0].dry_run);
    assert_eq!(h.swarm.limiter().count(Platform::X), 1);
    assert_eq!(h.swarm.queue().in_flight(), 0);

    let (state, _) = h.swarm.state().read().await.unwrap();
    assert_eq!(state.last_post_timestamp, Some(h.clock.now()));
    assert_eq!(state.budget_remaining, 99.0);

    let recent = h
        .swarm
        .memory()
        .get_recent("nova", ChronoDuration::hours(2), None)
        .await
        .unwrap();
    let kinds: Vec<&str> = recent.iter().map(|m| m.interaction_type.as_str()).collect();
    assert!(kinds.contains(&"generated"));
    assert!(kinds.contains(&"posted"));

    let metrics = h.swarm.monitor().metrics(Component::Publisher);
    assert_eq!(metrics.succeeded, 1);
}

#[tokio::test]
async fn test_worker_context_carries_recent_posts_and_goals() {
    let h = harness(FixedScorer::approving());
    h.run_post(Platform::LinkedIn).await;
    h.clock.advance(ChronoDuration::minutes(10));
    h.run_post(Platform::X).await;

    let request = h.backend.last_request.lock().clone().unwrap();
    assert!(request
        .context
        .recent_interactions
        .iter()
        .any(|s| s.contains("posted on linkedin")));
    assert_eq!(request.context.goals, vec!["grow the rust audience".to_string()]);
    assert!(request.context.state_version > 0);
}

#[tokio::test]
async fn test_occ_token_is_state_version_at_validation() {
    let h = harness(FixedScorer::approving());
    let dispatched = h.run_post(Platform::X).await;
    // One budget spend committed before the judge read the state.
    assert_eq!(dispatched.validation.occ_token, 1);
}

// ---------------------------------------------------------------------------
// Escalation and HITL
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_escalation_then_human_approval_publishes_once() {
    let h = harness(FixedScorer::escalating());

    let dispatched = h.run_post(Platform::X).await;
    assert_eq!(dispatched.validation.decision, Decision::Escalate);
    assert_eq!(
        dispatched.validation.escalation_reason,
        Some(ScoreComponent::Persona)
    );
    assert!(dispatched.publish.is_none());
    assert_eq!(h.swarm.hitl().len().await.unwrap(), 1);

    let pending = h.swarm.hitl().pending().await.unwrap();
    let result_id = pending[0].result.id;
    assert_eq!(result_id, dispatched.validation.result_id);

    let resolution = h
        .swarm
        .hitl()
        .decide(result_id, HumanDecision::approve("alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolution.validation.decision, Decision::Approve);
    assert_eq!(resolution.validation.reviewer.as_deref(), Some("alice"));
    assert!(matches!(
        resolution.publish,
        Some(PublishOutcome::Published { .. })
    ));

    // A second reviewer arrives too late.
    let late = h
        .swarm
        .hitl()
        .decide(result_id, HumanDecision::reject("bob", "off brand"))
        .await
        .unwrap();
    assert!(late.is_none());
    assert_eq!(h.publisher.calls(), 1);
    assert_eq!(h.swarm.hitl().len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_human_rejection_never_publishes() {
    let h = harness(FixedScorer::escalating());
    let dispatched = h.run_post(Platform::LinkedIn).await;

    let resolution = h
        .swarm
        .hitl()
        .decide(
            dispatched.validation.result_id,
            HumanDecision::reject("alice", "tone"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolution.validation.decision, Decision::Reject);
    assert_eq!(
        resolution.validation.rejection_reason,
        Some(RejectionReason::HumanRejected)
    );
    assert!(resolution.publish.is_none());
    assert_eq!(h.publisher.calls(), 0);
    assert_eq!(h.swarm.limiter().count(Platform::LinkedIn), 0);
}

#[tokio::test]
async fn test_hitl_timeout_rejects_after_24_hours() {
    let h = harness(FixedScorer::escalating());
    let dispatched = h.run_post(Platform::X).await;
    let result_id = dispatched.validation.result_id;

    h.clock
        .advance(ChronoDuration::hours(23) + ChronoDuration::minutes(59));
    assert!(h.swarm.hitl().sweep(h.clock.now()).await.unwrap().is_empty());

    h.clock.advance(ChronoDuration::minutes(1));
    let rejected = h.swarm.hitl().sweep(h.clock.now()).await.unwrap();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].result_id, result_id);
    assert_eq!(rejected[0].rejection_reason, Some(RejectionReason::HitlTimeout));

    // The sweep won; the human decision is a no-op.
    let late = h
        .swarm
        .hitl()
        .decide(result_id, HumanDecision::approve("alice"))
        .await
        .unwrap();
    assert!(late.is_none());
    assert_eq!(h.publisher.calls(), 0);

    // Sweeping again finds nothing.
    assert!(h.swarm.hitl().sweep(h.clock.now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_concurrent_decision_and_sweep_resolve_once() {
    let h = harness(FixedScorer::escalating());
    let dispatched = h.run_post(Platform::X).await;
    let result_id = dispatched.validation.result_id;
    h.clock.advance(ChronoDuration::hours(25));

    let hitl = h.swarm.hitl().clone();
    let now = h.clock.now();
    let (decided, swept) = tokio::join!(
        hitl.decide(result_id, HumanDecision::approve("alice")),
        hitl.sweep(now)
    );
    let decided = decided.unwrap().is_some();
    let swept = !swept.unwrap().is_empty();
    assert!(decided ^ swept, "exactly one resolution must win");
}

// ---------------------------------------------------------------------------
// Publisher gate and rate limits
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dry_run_still_counts_quota() {
    let config = SwarmConfig {
        dry_run: true,
        ..test_config()
    };
    let h = harness_with(config, ScriptedBackend::default(), FixedScorer::approving(), None);

    let dispatched = h.run_post(Platform::X).await;
    assert_eq!(dispatched.publish, Some(PublishOutcome::Simulated));
    assert_eq!(h.publisher.calls(), 0);
    assert_eq!(h.swarm.limiter().count(Platform::X), 1);

    let (state, _) = h.swarm.state().read().await.unwrap();
    assert!(state.last_post_timestamp.is_none());
}

#[tokio::test]
async fn test_gate_refuses_unsafe_or_mismatched_approvals() {
    let h = harness(FixedScorer::approving());
    let task = post_task(&h, Platform::X);
    let result = TaskResult::success(&task, "nova-worker-0", "Rust ships another release", 0);

    let mut unsafe_approval = ValidationResult::from_scores(
        result.id,
        ComponentScores::new(1.0, 1.0, 1.0, 1.0),
        0,
        h.clock.now(),
    );
    assert_eq!(unsafe_approval.decision, Decision::Approve);
    unsafe_approval.component_scores.safety = 0.3;
    assert_eq!(
        h.swarm.gate().publish(&result, &unsafe_approval).await,
        PublishOutcome::Refused
    );

    let other = ValidationResult::from_scores(
        uuid::Uuid::new_v4(),
        ComponentScores::new(1.0, 1.0, 1.0, 1.0),
        0,
        h.clock.now(),
    );
    assert_eq!(h.swarm.gate().publish(&result, &other).await, PublishOutcome::Refused);

    // Refusals happen before any quota is reserved.
    assert_eq!(h.swarm.limiter().count(Platform::X), 0);
    assert_eq!(h.publisher.calls(), 0);
}

#[tokio::test]
async fn test_platform_rate_limit_exhausts_local_quota() {
    let h = harness(FixedScorer::approving());
    h.publisher
        .responses
        .lock()
        .push_back(PublishResponse::failed(RATE_LIMIT_EXCEEDED));

    let first = h.run_post(Platform::X).await;
    assert_eq!(first.publish, Some(PublishOutcome::PlatformRateLimited));
    assert_eq!(h.swarm.limiter().remaining(Platform::X), 0);

    // The local counter now refuses before reaching the platform.
    let second = h.run_post(Platform::X).await;
    assert_eq!(second.publish, Some(PublishOutcome::Blocked));
    assert_eq!(h.publisher.calls(), 1);

    // Other platforms are unaffected.
    let linkedin = h.run_post(Platform::LinkedIn).await;
    assert!(matches!(
        linkedin.publish,
        Some(PublishOutcome::Published { .. })
    ));
}

#[tokio::test]
async fn test_local_quota_blocks_and_is_not_refunded() {
    let mut config = test_config();
    config.rate_limits.x = 2;
    let h = harness_with(config, ScriptedBackend::default(), FixedScorer::approving(), None);
    h.publisher
        .responses
        .lock()
        .push_back(PublishResponse::failed("INTERNAL"));

    let failed = h.run_post(Platform::X).await;
    assert_eq!(
        failed.publish,
        Some(PublishOutcome::Failed {
            error_code: "INTERNAL".into()
        })
    );
    assert!(matches!(
        h.run_post(Platform::X).await.publish,
        Some(PublishOutcome::Published { .. })
    ));
    // The failed attempt still consumed its ticket.
    assert_eq!(h.run_post(Platform::X).await.publish, Some(PublishOutcome::Blocked));
    assert_eq!(h.publisher.calls(), 2);
}

#[tokio::test]
async fn test_quota_resets_on_date_rollover() {
    let mut config = test_config();
    config.rate_limits.linkedin = 1;
    let h = harness_with(config, ScriptedBackend::default(), FixedScorer::approving(), None);

    assert!(matches!(
        h.run_post(Platform::LinkedIn).await.publish,
        Some(PublishOutcome::Published { .. })
    ));
    assert_eq!(
        h.run_post(Platform::LinkedIn).await.publish,
        Some(PublishOutcome::Blocked)
    );
    h.clock.advance(ChronoDuration::days(1));
    assert!(matches!(
        h.run_post(Platform::LinkedIn).await.publish,
        Some(PublishOutcome::Published { .. })
    ));
}

// ---------------------------------------------------------------------------
// Worker retries and judge failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_transient_failures_retry_until_max_then_fail() {
    let h = harness_with(
        test_config(),
        ScriptedBackend::failing_with(|| ChimeraError::TransientBackend("overloaded".into())),
        FixedScorer::approving(),
        None,
    );
    h.swarm.queue().enqueue(post_task(&h, Platform::X)).unwrap();

    let mut statuses = Vec::new();
    let mut retry_counts = Vec::new();
    while let Some(lease) = h.swarm.queue().try_dequeue() {
        retry_counts.push(lease.task.retry_count);
        statuses.push(h.swarm.worker().process(lease).await.status);
    }
    assert_eq!(retry_counts, vec![0, 1, 2, 3]);
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Retry,
            TaskStatus::Retry,
            TaskStatus::Retry,
            TaskStatus::Failure
        ]
    );
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.swarm.queue().in_flight(), 0);
    assert_eq!(h.swarm.monitor().metrics(Component::Worker).retried, 3);

    // Only the terminal failure reaches the judge, which rejects it unscored.
    assert_eq!(h.swarm.review().len(), 1);
    let failure = h.swarm.review().pop(Duration::from_millis(10)).await.unwrap();
    let dispatched = h.swarm.judge().dispatch(failure).await.unwrap();
    assert_eq!(dispatched.validation.decision, Decision::Reject);
    assert_eq!(
        dispatched.validation.rejection_reason,
        Some(RejectionReason::TaskFailed)
    );
    assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_retryable_failure_is_terminal_immediately() {
    let h = harness_with(
        test_config(),
        ScriptedBackend::failing_with(|| ChimeraError::NonRetryableInput("bad prompt".into())),
        FixedScorer::approving(),
        None,
    );
    h.swarm.queue().enqueue(post_task(&h, Platform::X)).unwrap();
    let lease = h.swarm.queue().try_dequeue().unwrap();
    let result = h.swarm.worker().process(lease).await;

    assert_eq!(result.status, TaskStatus::Failure);
    assert!(result.output.is_none());
    assert!(result.error.as_deref().unwrap().contains("bad prompt"));
    assert!(h.swarm.queue().is_empty());
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scorer_outage_rejects_with_zero_scores() {
    let h = harness(FixedScorer::unavailable());
    let dispatched = h.run_post(Platform::X).await;

    assert_eq!(dispatched.validation.decision, Decision::Reject);
    assert_eq!(
        dispatched.validation.rejection_reason,
        Some(RejectionReason::ScorerUnavailable)
    );
    assert_eq!(dispatched.validation.component_scores, ComponentScores::zero());
    // First attempt plus three retries.
    assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 4);
    assert_eq!(h.publisher.calls(), 0);
}

#[tokio::test]
async fn test_unsafe_content_is_rejected_by_safety_gate() {
    let h = harness(FixedScorer::new(ComponentScores::new(1.0, 0.4, 1.0, 1.0)));
    let dispatched = h.run_post(Platform::X).await;
    assert_eq!(dispatched.validation.decision, Decision::Reject);
    assert_eq!(
        dispatched.validation.rejection_reason,
        Some(RejectionReason::SafetyGate)
    );
    assert_eq!(h.publisher.calls(), 0);
}

#[tokio::test]
async fn test_degraded_state_serves_cache_and_reports_health() {
    let backend = Arc::new(InMemoryStateBackend::new(PlanningState::new(
        vec!["grow".into()],
        10.0,
    )));
    let h = harness_with(
        test_config(),
        ScriptedBackend::default(),
        FixedScorer::approving(),
        Some(backend.clone()),
    );
    h.swarm.state().read().await.unwrap();
    backend.set_online(false);

    h.swarm.queue().enqueue(post_task(&h, Platform::X)).unwrap();
    let lease = h.swarm.queue().try_dequeue().unwrap();
    let result = h.swarm.worker().process(lease).await;
    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(h.swarm.monitor().health(), Health::Degraded);

    backend.set_online(true);
    h.swarm.state().read().await.unwrap();
    assert_eq!(h.swarm.monitor().health(), Health::Healthy);
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

fn mention(id: &str) -> Mention {
    Mention {
        id: id.into(),
        author: "@ferris".into(),
        text: "what do you think about async traits?".into(),
        platform: Platform::X,
    }
}

fn rust_trend() -> Trend {
    Trend {
        topic: "rust 2024".into(),
        articles: vec![Article {
            title: "Rust 2024 edition lands".into(),
            summary: String::new(),
            url: None,
        }],
    }
}

#[tokio::test]
async fn test_planner_turns_signals_into_prioritized_tasks() {
    let h = harness(FixedScorer::approving());
    h.inbox
        .sender()
        .send(Signals {
            trends: vec![rust_trend()],
            mentions: vec![mention("m-1"), mention("m-1")],
        })
        .unwrap();

    let report = h.swarm.planner().plan_cycle().await.unwrap();
    assert_eq!(report.new_trends, 1);
    assert_eq!(report.replies, 1);
    assert_eq!(report.duplicate_mentions, 1);
    assert_eq!(report.enqueued, 3);
    assert_eq!(h.swarm.queue().lane_len(Priority::High), 2);
    assert_eq!(h.swarm.queue().lane_len(Priority::Medium), 1);

    let (state, _) = h.swarm.state().read().await.unwrap();
    assert_eq!(state.trending_topics, vec!["rust 2024".to_string()]);

    // High lane first: the trend post, then the reply.
    let first = h.swarm.queue().try_dequeue().unwrap();
    assert!(matches!(
        first.task.payload,
        TaskPayload::GeneratePost {
            platform: Platform::X,
            ..
        }
    ));
    let second = h.swarm.queue().try_dequeue().unwrap();
    assert!(matches!(second.task.payload, TaskPayload::GenerateReply { .. }));
    let third = h.swarm.queue().try_dequeue().unwrap();
    assert!(matches!(third.task.payload, TaskPayload::AnalyzeTrends { .. }));
}

/// Never answers a poll.
struct StalledSource;

#[async_trait]
impl SignalSource for StalledSource {
    async fn poll(&self) -> ChimeraResult<Signals> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_planner_bounds_a_stalled_signal_poll() {
    let config = SwarmConfig {
        signal_deadline_secs: 1,
        ..test_config()
    };
    let clock = ManualClock::new(start_time());
    let collaborators = Collaborators::new(
        Arc::new(ScriptedBackend::default()),
        Arc::new(FixedScorer::approving()),
        Arc::new(RecordingPublisher::default()),
        Arc::new(StalledSource),
    );
    let swarm = Swarm::with_clock(
        config,
        collaborators,
        Arc::new(AuditLog::disabled("nova")),
        clock.shared(),
    )
    .unwrap();

    let report = tokio::time::timeout(Duration::from_secs(5), swarm.planner().plan_cycle())
        .await
        .expect("planning cycle hung on the signal source")
        .unwrap();
    assert_eq!(report.enqueued, 0);
    assert!(!report.skipped_no_budget);
    assert_eq!(swarm.monitor().metrics(Component::Planner).failed, 1);
}

#[tokio::test]
async fn test_planner_dedups_mentions_for_24_hours() {
    let h = harness(FixedScorer::approving());
    let tx = h.inbox.sender();

    tx.send(Signals {
        trends: vec![rust_trend()],
        mentions: vec![mention("m-1")],
    })
    .unwrap();
    h.swarm.planner().plan_cycle().await.unwrap();

    tx.send(Signals {
        trends: vec![rust_trend()],
        mentions: vec![mention("m-1")],
    })
    .unwrap();
    let repeat = h.swarm.planner().plan_cycle().await.unwrap();
    assert_eq!(repeat.new_trends, 0);
    assert_eq!(repeat.replies, 0);
    assert_eq!(repeat.duplicate_mentions, 1);
    assert_eq!(repeat.enqueued, 0);

    h.clock.advance(ChronoDuration::hours(24) + ChronoDuration::seconds(1));
    tx.send(Signals {
        trends: vec![],
        mentions: vec![mention("m-1")],
    })
    .unwrap();
    let later = h.swarm.planner().plan_cycle().await.unwrap();
    assert_eq!(later.replies, 1);
}

#[tokio::test]
async fn test_planner_skips_cycle_without_budget() {
    let config = SwarmConfig {
        initial_budget: 0.0,
        ..test_config()
    };
    let h = harness_with(config, ScriptedBackend::default(), FixedScorer::approving(), None);
    h.inbox
        .sender()
        .send(Signals {
            trends: vec![rust_trend()],
            mentions: vec![mention("m-1")],
        })
        .unwrap();

    let report = h.swarm.planner().plan_cycle().await.unwrap();
    assert!(report.skipped_no_budget);
    assert!(h.swarm.queue().is_empty());
}

#[tokio::test]
async fn test_planner_fires_due_scheduled_posts() {
    let mut config = test_config();
    config.scheduled_posts = vec![ScheduledPost {
        name: "morning".into(),
        cron_expression: "0 0 9 * * *".into(),
        topic: "daily insight".into(),
        platform: Platform::LinkedIn,
        context_hint: Some("keep it short".into()),
        enabled: true,
        skip_if_posted_within_hours: None,
    }];
    let h = harness_with(config, ScriptedBackend::default(), FixedScorer::approving(), None);

    // 08:00 → 08:30: nothing due.
    h.clock.advance(ChronoDuration::minutes(30));
    assert_eq!(h.swarm.planner().plan_cycle().await.unwrap().scheduled, 0);

    // 08:30 → 09:00:10: the morning job fires once.
    h.clock
        .advance(ChronoDuration::minutes(30) + ChronoDuration::seconds(10));
    let report = h.swarm.planner().plan_cycle().await.unwrap();
    assert_eq!(report.scheduled, 1);
    assert_eq!(h.swarm.queue().lane_len(Priority::Low), 1);

    // Next cycle: already fired.
    h.clock.advance(ChronoDuration::seconds(30));
    assert_eq!(h.swarm.planner().plan_cycle().await.unwrap().scheduled, 0);
}

// ---------------------------------------------------------------------------
// Running swarm
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_swarm_loops_publish_and_stop_cleanly() {
    let config = SwarmConfig {
        workers: 2,
        judges: 1,
        planning_interval_secs: 1,
        ..test_config()
    };
    let h = harness_with(config, ScriptedBackend::default(), FixedScorer::approving(), None);
    h.inbox
        .sender()
        .send(Signals {
            trends: vec![],
            mentions: vec![mention("m-1"), mention("m-2")],
        })
        .unwrap();

    let handles = h.swarm.start_all();
    assert_eq!(handles.len(), 5);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while h.publisher.calls() < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for handle in handles {
        handle.stop().await;
    }

    assert_eq!(h.publisher.calls(), 2);
    assert_eq!(h.swarm.limiter().count(Platform::X), 2);
    assert!(h.swarm.queue().is_empty());
    assert_eq!(h.swarm.monitor().metrics(Component::Worker).succeeded, 2);
    assert_eq!(h.swarm.monitor().metrics(Component::Judge).succeeded, 2);
}

#[tokio::test]
async fn test_components_start_independently() {
    let h = harness(FixedScorer::approving());
    let workers = h.swarm.start_workers(3);
    assert_eq!(workers.task_count(), 3);
    assert_eq!(workers.name(), "worker");

    h.swarm.queue().enqueue(post_task(&h, Platform::X)).unwrap();
    let result = h.swarm.review().pop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(result.status, TaskStatus::Success);
    workers.stop().await;

    // Without judges nothing is published.
    assert_eq!(h.publisher.calls(), 0);
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !done() && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_worker_survives_backend_panic_and_reaper_reclaims_lease() {
    let config = SwarmConfig {
        reaper_interval_secs: 1,
        ..test_config()
    };
    let h = harness_with(config, ScriptedBackend::default(), FixedScorer::approving(), None);
    h.backend.panic_next.store(true, Ordering::SeqCst);
    let workers = h.swarm.start_workers(1);

    let task = post_task(&h, Platform::X);
    let task_id = task.id;
    h.swarm.queue().enqueue(task).unwrap();
    wait_until(|| h.swarm.monitor().metrics(Component::Worker).panicked == 1).await;
    assert_eq!(h.swarm.monitor().metrics(Component::Worker).panicked, 1);
    // The lease of the crashed iteration is still outstanding.
    assert_eq!(h.swarm.queue().in_flight(), 1);
    assert!(h.swarm.review().is_empty());

    let lease = ChronoDuration::from_std(h.swarm.config().lease_duration()).unwrap();
    h.clock.advance(lease + ChronoDuration::seconds(1));
    let reaper = h.swarm.start_reaper();

    // The same worker loop picks the reclaimed task up again.
    let result = h.swarm.review().pop(Duration::from_secs(10)).await.unwrap();
    assert_eq!(result.task_id, task_id);
    assert_eq!(result.status, TaskStatus::Success);
    assert_eq!(h.backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.swarm.monitor().metrics(Component::Worker).panicked, 1);

    reaper.stop().await;
    workers.stop().await;
    assert_eq!(h.swarm.queue().in_flight(), 0);
}

#[tokio::test]
async fn test_judge_survives_scorer_panic() {
    let h = harness(FixedScorer::approving());
    h.scorer.panic_next.store(true, Ordering::SeqCst);

    for _ in 0..2 {
        let task = post_task(&h, Platform::X);
        let result = TaskResult::success(&task, "nova-worker-0", "Rust ships another release", 0);
        h.swarm.review().push(result);
    }
    let judges = h.swarm.start_judges(1);
    wait_until(|| h.publisher.calls() == 1).await;
    judges.stop().await;

    let metrics = h.swarm.monitor().metrics(Component::Judge);
    assert_eq!(metrics.panicked, 1);
    assert_eq!(h.scorer.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.publisher.calls(), 1);
    assert!(h.swarm.review().is_empty());
}
