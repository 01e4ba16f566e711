use crate::scheduler::{ContentScheduler, ScheduledPost};
use chimera_agent::RetryPolicy;
use chimera_core::{ChimeraError, ChimeraResult};
use chimera_security::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one agent's swarm. Every field has a default, so an empty
/// TOML table is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
    /// Simulate publishing without calling the platform.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_judges")]
    pub judges: usize,

    #[serde(default)]
    pub goals: Vec<String>,
    #[serde(default = "default_initial_budget")]
    pub initial_budget: f64,
    /// Budget spent per successful generation.
    #[serde(default = "default_generation_cost")]
    pub generation_cost: f64,

    #[serde(default = "default_planning_interval_secs")]
    pub planning_interval_secs: u64,
    #[serde(default = "default_task_ttl_secs")]
    pub task_ttl_secs: u64,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
    #[serde(default = "default_hitl_sweep_interval_secs")]
    pub hitl_sweep_interval_secs: u64,
    #[serde(default = "default_hitl_timeout_hours")]
    pub hitl_timeout_hours: u64,

    #[serde(default = "default_generation_deadline_secs")]
    pub generation_deadline_secs: u64,
    #[serde(default = "default_scoring_deadline_secs")]
    pub scoring_deadline_secs: u64,
    #[serde(default = "default_publish_deadline_secs")]
    pub publish_deadline_secs: u64,
    #[serde(default = "default_signal_deadline_secs")]
    pub signal_deadline_secs: u64,

    #[serde(default = "default_episodic_ttl_hours")]
    pub episodic_ttl_hours: u64,
    #[serde(default = "default_context_window_hours")]
    pub context_window_hours: u64,
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,
    #[serde(default = "default_mention_dedup_hours")]
    pub mention_dedup_hours: u64,

    /// Consecutive state-store connectivity failures before health is fatal.
    #[serde(default = "default_fatal_after_failures")]
    pub fatal_after_failures: u32,

    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub rate_limits: RateLimitConfig,
    #[serde(default)]
    pub scheduled_posts: Vec<ScheduledPost>,
}

fn default_agent_id() -> String {
    "chimera".into()
}

fn default_workers() -> usize {
    4
}

fn default_judges() -> usize {
    2
}

fn default_initial_budget() -> f64 {
    100.0
}

fn default_generation_cost() -> f64 {
    1.0
}

fn default_planning_interval_secs() -> u64 {
    30
}

fn default_task_ttl_secs() -> u64 {
    3600
}

fn default_lease_secs() -> u64 {
    120
}

fn default_reaper_interval_secs() -> u64 {
    15
}

fn default_hitl_sweep_interval_secs() -> u64 {
    300
}

fn default_hitl_timeout_hours() -> u64 {
    24
}

fn default_generation_deadline_secs() -> u64 {
    60
}

fn default_scoring_deadline_secs() -> u64 {
    30
}

fn default_publish_deadline_secs() -> u64 {
    30
}

fn default_signal_deadline_secs() -> u64 {
    10
}

fn default_episodic_ttl_hours() -> u64 {
    2
}

fn default_context_window_hours() -> u64 {
    2
}

fn default_context_limit() -> usize {
    10
}

fn default_mention_dedup_hours() -> u64 {
    24
}

fn default_fatal_after_failures() -> u32 {
    10
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            agent_id: default_agent_id(),
            dry_run: false,
            workers: default_workers(),
            judges: default_judges(),
            goals: Vec::new(),
            initial_budget: default_initial_budget(),
            generation_cost: default_generation_cost(),
            planning_interval_secs: default_planning_interval_secs(),
            task_ttl_secs: default_task_ttl_secs(),
            lease_secs: default_lease_secs(),
            reaper_interval_secs: default_reaper_interval_secs(),
            hitl_sweep_interval_secs: default_hitl_sweep_interval_secs(),
            hitl_timeout_hours: default_hitl_timeout_hours(),
            generation_deadline_secs: default_generation_deadline_secs(),
            scoring_deadline_secs: default_scoring_deadline_secs(),
            publish_deadline_secs: default_publish_deadline_secs(),
            signal_deadline_secs: default_signal_deadline_secs(),
            episodic_ttl_hours: default_episodic_ttl_hours(),
            context_window_hours: default_context_window_hours(),
            context_limit: default_context_limit(),
            mention_dedup_hours: default_mention_dedup_hours(),
            fatal_after_failures: default_fatal_after_failures(),
            retry: RetryPolicy::default(),
            rate_limits: RateLimitConfig::default(),
            scheduled_posts: Vec::new(),
        }
    }
}

// Caps keep chrono's constructors from overflowing on absurd inputs.
const MAX_HOURS: u64 = 1_000_000;

fn hours(h: u64) -> chrono::Duration {
    chrono::Duration::hours(i64::try_from(h.min(MAX_HOURS)).unwrap_or_default())
}

fn secs(s: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(s.min(MAX_HOURS * 3600)).unwrap_or_default())
}

impl SwarmConfig {
    /// Parse from TOML text.
    pub fn from_toml(text: &str) -> ChimeraResult<Self> {
        toml::from_str(text).map_err(|e| ChimeraError::Config(e.to_string()))
    }

    /// Reject configurations the swarm cannot run with.
    pub fn validate(&self) -> ChimeraResult<()> {
        if self.agent_id.trim().is_empty() {
            return Err(ChimeraError::Config("agent_id must not be empty".into()));
        }
        if self.workers == 0 || self.judges == 0 {
            return Err(ChimeraError::Config(
                "workers and judges must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("planning_interval_secs", self.planning_interval_secs),
            ("task_ttl_secs", self.task_ttl_secs),
            ("lease_secs", self.lease_secs),
            ("reaper_interval_secs", self.reaper_interval_secs),
            ("hitl_sweep_interval_secs", self.hitl_sweep_interval_secs),
            ("hitl_timeout_hours", self.hitl_timeout_hours),
            ("generation_deadline_secs", self.generation_deadline_secs),
            ("scoring_deadline_secs", self.scoring_deadline_secs),
            ("publish_deadline_secs", self.publish_deadline_secs),
            ("signal_deadline_secs", self.signal_deadline_secs),
        ] {
            if value == 0 {
                return Err(ChimeraError::Config(format!("{name} must be positive")));
            }
        }
        let negative = |v: f64| v.is_nan() || v < 0.0;
        if negative(self.generation_cost) || negative(self.initial_budget) {
            return Err(ChimeraError::Config(
                "budget and generation_cost must be non-negative".into(),
            ));
        }
        ContentScheduler::new(self.scheduled_posts.clone())?;
        Ok(())
    }

    pub fn planning_interval(&self) -> Duration {
        Duration::from_secs(self.planning_interval_secs)
    }

    pub fn task_ttl(&self) -> chrono::Duration {
        secs(self.task_ttl_secs)
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn hitl_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.hitl_sweep_interval_secs)
    }

    pub fn hitl_timeout(&self) -> chrono::Duration {
        hours(self.hitl_timeout_hours)
    }

    pub fn generation_deadline(&self) -> Duration {
        Duration::from_secs(self.generation_deadline_secs)
    }

    pub fn scoring_deadline(&self) -> Duration {
        Duration::from_secs(self.scoring_deadline_secs)
    }

    pub fn publish_deadline(&self) -> Duration {
        Duration::from_secs(self.publish_deadline_secs)
    }

    pub fn signal_deadline(&self) -> Duration {
        Duration::from_secs(self.signal_deadline_secs)
    }

    pub fn episodic_ttl(&self) -> chrono::Duration {
        hours(self.episodic_ttl_hours)
    }

    pub fn context_window(&self) -> chrono::Duration {
        hours(self.context_window_hours)
    }

    pub fn mention_dedup_ttl(&self) -> chrono::Duration {
        hours(self.mention_dedup_hours)
    }
}
