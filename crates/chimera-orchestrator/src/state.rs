use crate::monitor::{Health, SwarmMonitor};
use async_trait::async_trait;
use chimera_core::{keys, ChimeraError, ChimeraResult};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Commit attempts made by [`PlanningStore::update_with_retry`].
pub const MAX_OCC_ATTEMPTS: u32 = 5;

/// Trending topics kept in the planning state.
pub const MAX_TRENDING_TOPICS: usize = 20;

/// Shared planning state for one agent. Only ever replaced whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningState {
    pub version: u64,
    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default)]
    pub active_campaigns: Vec<String>,
    pub budget_remaining: f64,
    #[serde(default)]
    pub last_post_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub trending_topics: Vec<String>,
}

impl PlanningState {
    pub fn new(goals: Vec<String>, budget: f64) -> Self {
        Self {
            goals,
            budget_remaining: budget,
            ..Self::default()
        }
    }

    /// Record a topic as trending, newest last, dropping the oldest beyond
    /// [`MAX_TRENDING_TOPICS`]. Returns `false` if it was already tracked.
    pub fn push_trend(&mut self, topic: &str) -> bool {
        if self.trending_topics.iter().any(|t| t == topic) {
            return false;
        }
        self.trending_topics.push(topic.to_string());
        if self.trending_topics.len() > MAX_TRENDING_TOPICS {
            let excess = self.trending_topics.len() - MAX_TRENDING_TOPICS;
            self.trending_topics.drain(..excess);
        }
        true
    }

    pub fn spend(&mut self, cost: f64) {
        self.budget_remaining = (self.budget_remaining - cost).max(0.0);
    }
}

/// Storage with an atomic compare-and-swap on the state version.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn load(&self) -> ChimeraResult<PlanningState>;

    /// Replace the stored state with `next` if its version is still
    /// `expected`, bumping the version by one. Fails with
    /// [`ChimeraError::Conflict`] otherwise.
    async fn compare_and_swap(&self, expected: u64, next: PlanningState) -> ChimeraResult<u64>;
}

/// In-memory [`StateBackend`]. Connectivity can be toggled to exercise
/// degraded operation.
pub struct InMemoryStateBackend {
    state: Mutex<PlanningState>,
    online: AtomicBool,
}

impl InMemoryStateBackend {
    pub fn new(initial: PlanningState) -> Self {
        Self {
            state: Mutex::new(initial),
            online: AtomicBool::new(true),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn check_online(&self) -> ChimeraResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ChimeraError::ConnectivityLoss(
                "state backend unreachable".into(),
            ))
        }
    }
}

#[async_trait]
impl StateBackend for InMemoryStateBackend {
    async fn load(&self) -> ChimeraResult<PlanningState> {
        self.check_online()?;
        Ok(self.state.lock().clone())
    }

    async fn compare_and_swap(&self, expected: u64, mut next: PlanningState) -> ChimeraResult<u64> {
        self.check_online()?;
        let mut state = self.state.lock();
        if state.version != expected {
            return Err(ChimeraError::Conflict {
                expected,
                actual: state.version,
            });
        }
        next.version = expected + 1;
        *state = next;
        Ok(state.version)
    }
}

/// OCC front end over a [`StateBackend`].
///
/// Reads fall back to the last snapshot observed while the backend is
/// unreachable; writes never do.
pub struct PlanningStore {
    key: String,
    backend: Arc<dyn StateBackend>,
    cache: Mutex<Option<PlanningState>>,
    consecutive_failures: AtomicU32,
    fatal_after: u32,
    monitor: Option<Arc<SwarmMonitor>>,
}

impl PlanningStore {
    pub fn new(agent_id: &str, backend: Arc<dyn StateBackend>) -> Self {
        Self {
            key: keys::planning_state(agent_id),
            backend,
            cache: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            fatal_after: 10,
            monitor: None,
        }
    }

    /// Report health transitions to `monitor`.
    pub fn with_monitor(mut self, monitor: Arc<SwarmMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Consecutive connectivity failures before health turns fatal.
    pub fn with_fatal_after(mut self, failures: u32) -> Self {
        self.fatal_after = failures.max(1);
        self
    }

    /// Current state and its version, or the cached snapshot while the
    /// backend is unreachable.
    pub async fn read(&self) -> ChimeraResult<(PlanningState, u64)> {
        match self.load_fresh().await {
            Ok(state) => {
                let version = state.version;
                Ok((state, version))
            }
            Err(ChimeraError::ConnectivityLoss(reason)) => {
                let cached = self.cache.lock().clone();
                match cached {
                    Some(state) => {
                        warn!(key = %self.key, version = state.version, %reason, "Serving cached planning state");
                        let version = state.version;
                        Ok((state, version))
                    }
                    None => Err(ChimeraError::ConnectivityLoss(reason)),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Apply `mutation` on top of `version` and commit it.
    ///
    /// Fails with [`ChimeraError::Conflict`] if the state has moved past
    /// `version`; nothing is written in that case.
    pub async fn update<F>(&self, version: u64, mutation: F) -> ChimeraResult<u64>
    where
        F: FnOnce(&mut PlanningState),
    {
        let current = self.load_fresh().await?;
        if current.version != version {
            return Err(ChimeraError::Conflict {
                expected: version,
                actual: current.version,
            });
        }
        self.commit(current, mutation).await
    }

    /// Re-read, reapply and recommit until the commit lands, giving up with
    /// [`ChimeraError::StateContention`] after [`MAX_OCC_ATTEMPTS`].
    pub async fn update_with_retry<F>(&self, mutation: F) -> ChimeraResult<u64>
    where
        F: Fn(&mut PlanningState),
    {
        for attempt in 1..=MAX_OCC_ATTEMPTS {
            let current = self.load_fresh().await?;
            match self.commit(current, &mutation).await {
                Ok(version) => return Ok(version),
                Err(ChimeraError::Conflict { expected, actual }) => {
                    debug!(key = %self.key, attempt, expected, actual, "OCC conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        warn!(key = %self.key, attempts = MAX_OCC_ATTEMPTS, "OCC retries exhausted");
        Err(ChimeraError::StateContention {
            attempts: MAX_OCC_ATTEMPTS,
        })
    }

    /// Health as seen by this store.
    pub fn health(&self) -> Health {
        let failures = self.consecutive_failures.load(Ordering::SeqCst);
        if failures == 0 {
            Health::Healthy
        } else if failures >= self.fatal_after {
            Health::Fatal
        } else {
            Health::Degraded
        }
    }

    async fn commit<F>(&self, current: PlanningState, mutation: F) -> ChimeraResult<u64>
    where
        F: FnOnce(&mut PlanningState),
    {
        let expected = current.version;
        let mut next = current;
        mutation(&mut next);
        let result = self.backend.compare_and_swap(expected, next.clone()).await;
        match &result {
            Ok(version) => {
                next.version = *version;
                *self.cache.lock() = Some(next);
                self.observe_success();
                debug!(key = %self.key, version, "Planning state committed");
            }
            Err(ChimeraError::ConnectivityLoss(_)) => self.observe_failure(),
            Err(_) => {}
        }
        result
    }

    async fn load_fresh(&self) -> ChimeraResult<PlanningState> {
        match self.backend.load().await {
            Ok(state) => {
                *self.cache.lock() = Some(state.clone());
                self.observe_success();
                Ok(state)
            }
            Err(e) => {
                if matches!(e, ChimeraError::ConnectivityLoss(_)) {
                    self.observe_failure();
                }
                Err(e)
            }
        }
    }

    fn observe_success(&self) {
        if self.consecutive_failures.swap(0, Ordering::SeqCst) > 0 {
            self.publish_health();
        }
    }

    fn observe_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::SeqCst);
        self.publish_health();
    }

    fn publish_health(&self) {
        if let Some(monitor) = &self.monitor {
            monitor.set_health(self.health());
        }
    }
}
