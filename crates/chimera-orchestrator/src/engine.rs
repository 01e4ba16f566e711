use crate::config::SwarmConfig;
use crate::hitl::HitlQueue;
use crate::judge::ValidationPipeline;
use crate::monitor::{Component, Counter, SwarmMonitor};
use crate::planner::{Planner, PlannerSettings};
use crate::publisher::{GateSettings, PublisherGate};
use crate::review_queue::ReviewQueue;
use crate::scheduler::ContentScheduler;
use crate::state::{InMemoryStateBackend, PlanningState, PlanningStore, StateBackend};
use crate::task_queue::TaskQueue;
use crate::worker::{WorkerDispatcher, WorkerSettings};
use chimera_agent::{ContentScorer, GenerationBackend};
use chimera_channels::{PlatformPublisher, SignalSource};
use chimera_core::{ChimeraResult, SharedClock, SystemClock};
use chimera_memory::{
    InMemoryShortTermStore, InMemoryTimeOrderedSet, InMemoryTtlStore, ShortTermStore, TtlStore,
};
use chimera_security::{AuditLog, RateLimiter};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// External systems the swarm talks to.
pub struct Collaborators {
    pub backend: Arc<dyn GenerationBackend>,
    pub scorer: Arc<dyn ContentScorer>,
    pub publisher: Arc<dyn PlatformPublisher>,
    pub signals: Arc<dyn SignalSource>,
    /// Planning state storage; in-memory when unset.
    pub state: Option<Arc<dyn StateBackend>>,
}

impl Collaborators {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        scorer: Arc<dyn ContentScorer>,
        publisher: Arc<dyn PlatformPublisher>,
        signals: Arc<dyn SignalSource>,
    ) -> Self {
        Self {
            backend,
            scorer,
            publisher,
            signals,
            state: None,
        }
    }

    pub fn with_state_backend(mut self, state: Arc<dyn StateBackend>) -> Self {
        self.state = Some(state);
        self
    }
}

/// A running component. Dropping the handle leaves its tasks running;
/// call [`ComponentHandle::stop`] to shut it down.
pub struct ComponentHandle {
    name: String,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ComponentHandle {
    fn new(name: impl Into<String>) -> (Self, watch::Receiver<bool>) {
        let (shutdown, rx) = watch::channel(false);
        (
            Self {
                name: name.into(),
                shutdown,
                tasks: Vec::new(),
            },
            rx,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of loops this handle runs.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signal shutdown and wait for every loop to exit.
    pub async fn stop(self) {
        info!(component = %self.name, "Stopping");
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(component = %self.name, error = %e, "Component task ended abnormally");
            }
        }
        info!(component = %self.name, "Stopped");
    }
}

/// Owns the shared components of one agent and starts their loops.
pub struct Swarm {
    config: SwarmConfig,
    clock: SharedClock,
    monitor: Arc<SwarmMonitor>,
    queue: Arc<TaskQueue>,
    review: Arc<ReviewQueue>,
    state: Arc<PlanningStore>,
    memory: Arc<dyn ShortTermStore>,
    dedup: Arc<dyn TtlStore>,
    limiter: Arc<RateLimiter>,
    gate: Arc<PublisherGate>,
    hitl: Arc<HitlQueue>,
    judge: Arc<ValidationPipeline>,
    worker: WorkerDispatcher,
    planner: Arc<Planner>,
}

impl Swarm {
    pub fn new(
        config: SwarmConfig,
        collaborators: Collaborators,
        audit: Arc<AuditLog>,
    ) -> ChimeraResult<Self> {
        Self::with_clock(config, collaborators, audit, SystemClock::shared())
    }

    /// Build the swarm on an explicit clock.
    pub fn with_clock(
        config: SwarmConfig,
        collaborators: Collaborators,
        audit: Arc<AuditLog>,
        clock: SharedClock,
    ) -> ChimeraResult<Self> {
        config.validate()?;
        let agent_id = config.agent_id.clone();
        let monitor = Arc::new(SwarmMonitor::new());

        let backend: Arc<dyn StateBackend> = match collaborators.state {
            Some(backend) => backend,
            None => Arc::new(InMemoryStateBackend::new(PlanningState::new(
                config.goals.clone(),
                config.initial_budget,
            ))),
        };
        let state = Arc::new(
            PlanningStore::new(&agent_id, backend)
                .with_monitor(monitor.clone())
                .with_fatal_after(config.fatal_after_failures),
        );
        let queue = Arc::new(TaskQueue::with_clock(
            agent_id.clone(),
            config.lease_duration(),
            clock.clone(),
        ));
        let review = Arc::new(ReviewQueue::new());
        let memory: Arc<dyn ShortTermStore> =
            Arc::new(InMemoryShortTermStore::with_clock(clock.clone()));
        let dedup: Arc<dyn TtlStore> = Arc::new(InMemoryTtlStore::with_clock(clock.clone()));
        let limiter = Arc::new(RateLimiter::with_clock(
            config.rate_limits.clone(),
            clock.clone(),
        ));

        let gate = Arc::new(PublisherGate::new(
            agent_id.clone(),
            collaborators.publisher,
            limiter.clone(),
            state.clone(),
            memory.clone(),
            audit.clone(),
            monitor.clone(),
            clock.clone(),
            GateSettings {
                dry_run: config.dry_run,
                deadline: config.publish_deadline(),
                episodic_ttl: config.episodic_ttl(),
            },
        ));
        let hitl = Arc::new(HitlQueue::new(
            agent_id.clone(),
            Arc::new(InMemoryTimeOrderedSet::new()),
            config.hitl_timeout(),
            state.clone(),
            gate.clone(),
            audit.clone(),
            monitor.clone(),
            clock.clone(),
        ));
        let judge = Arc::new(ValidationPipeline::new(
            agent_id.clone(),
            collaborators.scorer,
            state.clone(),
            hitl.clone(),
            gate.clone(),
            audit,
            monitor.clone(),
            config.retry.clone(),
            config.scoring_deadline(),
            clock.clone(),
        ));
        let worker = WorkerDispatcher::new(
            agent_id.clone(),
            queue.clone(),
            review.clone(),
            collaborators.backend,
            memory.clone(),
            state.clone(),
            monitor.clone(),
            WorkerSettings {
                deadline: config.generation_deadline(),
                retry: config.retry.clone(),
                generation_cost: config.generation_cost,
                context_window: config.context_window(),
                context_limit: config.context_limit,
                episodic_ttl: config.episodic_ttl(),
            },
        );
        let planner = Arc::new(Planner::new(
            agent_id.clone(),
            collaborators.signals,
            queue.clone(),
            state.clone(),
            dedup.clone(),
            ContentScheduler::new(config.scheduled_posts.clone())?,
            monitor.clone(),
            PlannerSettings {
                task_ttl: config.task_ttl(),
                mention_dedup_ttl: config.mention_dedup_ttl(),
                poll_deadline: config.signal_deadline(),
            },
            clock.clone(),
        ));

        info!(
            %agent_id,
            dry_run = config.dry_run,
            workers = config.workers,
            judges = config.judges,
            scheduled_posts = config.scheduled_posts.len(),
            "Swarm assembled"
        );
        Ok(Self {
            config,
            clock,
            monitor,
            queue,
            review,
            state,
            memory,
            dedup,
            limiter,
            gate,
            hitl,
            judge,
            worker,
            planner,
        })
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<SwarmMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn review(&self) -> &Arc<ReviewQueue> {
        &self.review
    }

    pub fn state(&self) -> &Arc<PlanningStore> {
        &self.state
    }

    pub fn memory(&self) -> &Arc<dyn ShortTermStore> {
        &self.memory
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn gate(&self) -> &Arc<PublisherGate> {
        &self.gate
    }

    pub fn hitl(&self) -> &Arc<HitlQueue> {
        &self.hitl
    }

    pub fn judge(&self) -> &Arc<ValidationPipeline> {
        &self.judge
    }

    pub fn worker(&self) -> &WorkerDispatcher {
        &self.worker
    }

    pub fn planner(&self) -> &Arc<Planner> {
        &self.planner
    }

    pub fn start_planner(&self) -> ComponentHandle {
        let (mut handle, rx) = ComponentHandle::new(Component::Planner.to_string());
        let planner = self.planner.clone();
        let interval = self.config.planning_interval();
        handle
            .tasks
            .push(tokio::spawn(async move { planner.run(interval, rx).await }));
        handle
    }

    pub fn start_workers(&self, n: usize) -> ComponentHandle {
        let (mut handle, rx) = ComponentHandle::new(Component::Worker.to_string());
        for i in 0..n {
            let worker = self
                .worker
                .with_id(format!("{}-worker-{i}", self.config.agent_id));
            let rx = rx.clone();
            handle.tasks.push(tokio::spawn(worker.run(rx)));
        }
        info!(count = n, "Workers started");
        handle
    }

    pub fn start_judges(&self, n: usize) -> ComponentHandle {
        let (mut handle, rx) = ComponentHandle::new(Component::Judge.to_string());
        for i in 0..n {
            let judge = self.judge.clone();
            let review = self.review.clone();
            let judge_id = format!("{}-judge-{i}", self.config.agent_id);
            let rx = rx.clone();
            handle
                .tasks
                .push(tokio::spawn(async move { judge.run(judge_id, review, rx).await }));
        }
        info!(count = n, "Judges started");
        handle
    }

    /// Start the HITL timeout sweep.
    pub fn start_sweeper(&self) -> ComponentHandle {
        let (mut handle, rx) = ComponentHandle::new(Component::Hitl.to_string());
        let hitl = self.hitl.clone();
        let interval = self.config.hitl_sweep_interval();
        handle
            .tasks
            .push(tokio::spawn(async move { hitl.run_sweeper(interval, rx).await }));
        handle
    }

    /// Start the loop that reclaims expired leases and purges expired
    /// memory and dedup entries.
    pub fn start_reaper(&self) -> ComponentHandle {
        let (mut handle, mut rx) = ComponentHandle::new(Component::Reaper.to_string());
        let queue = self.queue.clone();
        let memory = self.memory.clone();
        let dedup = self.dedup.clone();
        let monitor = self.monitor.clone();
        let interval = self.config.reaper_interval();
        handle.tasks.push(tokio::spawn(async move {
            info!(?interval, "Reaper started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = rx.changed() => break,
                    _ = ticker.tick() => reap(&queue, memory.as_ref(), dedup.as_ref(), &monitor).await,
                }
            }
            info!("Reaper stopped");
        }));
        handle
    }

    /// Start everything with the configured pool sizes.
    pub fn start_all(&self) -> Vec<ComponentHandle> {
        vec![
            self.start_reaper(),
            self.start_sweeper(),
            self.start_judges(self.config.judges),
            self.start_workers(self.config.workers),
            self.start_planner(),
        ]
    }

    /// Current time on the swarm's clock.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

async fn reap(
    queue: &TaskQueue,
    memory: &dyn ShortTermStore,
    dedup: &dyn TtlStore,
    monitor: &SwarmMonitor,
) {
    monitor.record(Component::Reaper, Counter::Processed);
    let reclaimed = queue.reclaim_expired();
    if reclaimed > 0 {
        warn!(reclaimed, "Requeued tasks with expired leases");
        monitor.record(Component::Reaper, Counter::Retried);
    }
    let mut failed = false;
    match memory.purge_expired().await {
        Ok(n) if n > 0 => debug!(purged = n, "Purged expired episodic memories"),
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "Episodic purge failed");
            failed = true;
        }
    }
    match dedup.purge_expired().await {
        Ok(n) if n > 0 => debug!(purged = n, "Purged expired dedup markers"),
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "Dedup purge failed");
            failed = true;
        }
    }
    monitor.record(
        Component::Reaper,
        if failed {
            Counter::Failed
        } else {
            Counter::Succeeded
        },
    );
}
