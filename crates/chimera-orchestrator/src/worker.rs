use crate::monitor::{Component, Counter, SwarmMonitor};
use crate::review_queue::ReviewQueue;
use crate::state::{PlanningState, PlanningStore};
use crate::task_queue::{Lease, TaskQueue};
use chimera_agent::{GenerationBackend, GenerationContext, GenerationRequest, RetryPolicy};
use chimera_core::{AgentTask, ChimeraError, ChimeraResult, TaskResult};
use chimera_memory::{Interaction, ShortTermStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How long an idle worker waits on the queue before re-checking shutdown.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub deadline: Duration,
    pub retry: RetryPolicy,
    pub generation_cost: f64,
    pub context_window: chrono::Duration,
    pub context_limit: usize,
    pub episodic_ttl: chrono::Duration,
}

/// Executes tasks: builds context, calls the generation backend, and
/// hands results to the judges.
#[derive(Clone)]
pub struct WorkerDispatcher {
    worker_id: String,
    agent_id: String,
    queue: Arc<TaskQueue>,
    review: Arc<ReviewQueue>,
    backend: Arc<dyn GenerationBackend>,
    memory: Arc<dyn ShortTermStore>,
    state: Arc<PlanningStore>,
    monitor: Arc<SwarmMonitor>,
    settings: WorkerSettings,
}

impl WorkerDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        queue: Arc<TaskQueue>,
        review: Arc<ReviewQueue>,
        backend: Arc<dyn GenerationBackend>,
        memory: Arc<dyn ShortTermStore>,
        state: Arc<PlanningStore>,
        monitor: Arc<SwarmMonitor>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            worker_id: "worker-0".into(),
            agent_id: agent_id.into(),
            queue,
            review,
            backend,
            memory,
            state,
            monitor,
            settings,
        }
    }

    /// A copy of this dispatcher with another worker id.
    pub fn with_id(&self, worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            ..self.clone()
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Execute one leased task.
    ///
    /// The lease is acked on every path. Successes and terminal failures go
    /// to the review queue; transient failures with retries left are
    /// re-enqueued after a backoff and reported as [`TaskStatus::Retry`].
    ///
    /// [`TaskStatus::Retry`]: chimera_core::TaskStatus::Retry
    pub async fn process(&self, lease: Lease) -> TaskResult {
        let task = lease.task;
        let started = Instant::now();
        self.monitor.record(Component::Worker, Counter::Processed);
        info!(worker_id = %self.worker_id, task_id = %task.id, task_type = %task.task_type(), "Processing task");

        let (outcome, version) = match self.state.read().await {
            Ok((snapshot, version)) => (self.generate(&task, &snapshot, version).await, version),
            Err(e) => (Err(e), 0),
        };
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(response) => {
                let result = TaskResult::success(&task, &self.worker_id, response.content, version)
                    .with_self_confidence(response.confidence_self_assessment)
                    .with_execution_time(elapsed_ms);
                self.record_generation(&task, &result).await;
                self.monitor.record(Component::Worker, Counter::Succeeded);
                self.review.push(result.clone());
                result
            }
            Err(e) if e.is_retryable() && task.can_retry() => {
                let delay = self.settings.retry.backoff(task.retry_count);
                warn!(
                    worker_id = %self.worker_id,
                    task_id = %task.id,
                    retry_count = task.retry_count + 1,
                    max_retries = task.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Transient failure, re-enqueueing"
                );
                self.queue.heartbeat(lease.lease_id);
                tokio::time::sleep(delay).await;
                let mut retried = task.clone();
                retried.retry_count += 1;
                match self.queue.enqueue(retried) {
                    Ok(()) => {
                        self.monitor.record(Component::Worker, Counter::Retried);
                        TaskResult::retry(&task, &self.worker_id, e.to_string(), version)
                            .with_execution_time(elapsed_ms)
                    }
                    Err(enqueue_err) => self.fail(&task, enqueue_err, version, elapsed_ms),
                }
            }
            Err(e) => self.fail(&task, e, version, elapsed_ms),
        };

        self.queue.ack(lease.lease_id);
        result
    }

    /// Pull and process tasks until `shutdown` flips.
    ///
    /// Each task runs in its own tokio task so a panic is contained; the
    /// lease of a panicked task is left to the reaper.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "Worker started");
        let this = Arc::new(self);
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                lease = this.queue.dequeue(POLL_INTERVAL) => {
                    let Some(lease) = lease else { continue };
                    let worker = this.clone();
                    let task_id = lease.task.id;
                    if let Err(e) = tokio::spawn(async move { worker.process(lease).await }).await {
                        error!(worker_id = %this.worker_id, %task_id, error = %e, "Worker iteration panicked");
                        this.monitor.record(Component::Worker, Counter::Panicked);
                    }
                }
            }
        }
        info!(worker_id = %this.worker_id, "Worker stopped");
    }

    async fn generate(
        &self,
        task: &AgentTask,
        snapshot: &PlanningState,
        version: u64,
    ) -> ChimeraResult<chimera_agent::GenerationResponse> {
        let recent_interactions = match self
            .memory
            .get_recent(
                &self.agent_id,
                self.settings.context_window,
                Some(self.settings.context_limit),
            )
            .await
        {
            Ok(entries) => entries.iter().map(|m| m.summary()).collect(),
            Err(e) => {
                warn!(worker_id = %self.worker_id, error = %e, "Context unavailable, generating without it");
                Vec::new()
            }
        };

        let request = GenerationRequest {
            task_type: task.task_type(),
            payload: task.payload.clone(),
            context: GenerationContext {
                recent_interactions,
                goals: snapshot.goals.clone(),
                trending_topics: snapshot.trending_topics.clone(),
                state_version: version,
            },
        };

        tokio::time::timeout(self.settings.deadline, self.backend.generate(&request))
            .await
            .map_err(|_| ChimeraError::Timeout(self.settings.deadline))?
    }

    async fn record_generation(&self, task: &AgentTask, result: &TaskResult) {
        let content = result.output.clone().unwrap_or_default();
        let interaction = Interaction::new("generated", content)
            .on(result.platform)
            .with_metadata("task_id", serde_json::json!(task.id))
            .with_metadata("task_type", serde_json::json!(task.task_type()));
        if let Err(e) = self
            .memory
            .put(&self.agent_id, interaction, self.settings.episodic_ttl)
            .await
        {
            warn!(worker_id = %self.worker_id, error = %e, "Could not record generation in memory");
        }

        let cost = self.settings.generation_cost;
        if cost > 0.0 {
            if let Err(e) = self.state.update_with_retry(|s| s.spend(cost)).await {
                warn!(worker_id = %self.worker_id, task_id = %task.id, error = %e, "Could not spend generation budget");
            }
        }
    }

    fn fail(&self, task: &AgentTask, error: ChimeraError, version: u64, elapsed_ms: u64) -> TaskResult {
        warn!(
            worker_id = %self.worker_id,
            task_id = %task.id,
            retry_count = task.retry_count,
            error = %error,
            "Task failed"
        );
        self.monitor.record(Component::Worker, Counter::Failed);
        let result = TaskResult::failure(task, &self.worker_id, error.to_string(), version)
            .with_execution_time(elapsed_ms);
        self.review.push(result.clone());
        result
    }
}
