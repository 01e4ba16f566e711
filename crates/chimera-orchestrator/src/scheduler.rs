use chimera_core::{ChimeraError, ChimeraResult, Platform};
use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A recurring content job, e.g. a daily morning post.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub name: String,
    /// 6- or 7-field cron expression (seconds first), evaluated in UTC.
    pub cron_expression: String,
    pub topic: String,
    pub platform: Platform,
    #[serde(default)]
    pub context_hint: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Skip a firing if something was published this recently.
    #[serde(default)]
    pub skip_if_posted_within_hours: Option<u32>,
}

fn default_enabled() -> bool {
    true
}

impl ScheduledPost {
    /// Whether a firing at `now` should be skipped given the last publish.
    pub fn recently_posted(&self, last_post: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match (self.skip_if_posted_within_hours, last_post) {
            (Some(hours), Some(last)) => now - last < chrono::Duration::hours(i64::from(hours)),
            _ => false,
        }
    }
}

/// Cron evaluation for the enabled [`ScheduledPost`]s.
///
/// Holds no timers of its own: the planner asks which jobs fell due between
/// two cycles.
#[derive(Debug)]
pub struct ContentScheduler {
    jobs: Vec<(ScheduledPost, Schedule)>,
    total: usize,
}

impl ContentScheduler {
    /// Parse every enabled job. Any invalid expression is a config error.
    pub fn new(posts: Vec<ScheduledPost>) -> ChimeraResult<Self> {
        let total = posts.len();
        let jobs = posts
            .into_iter()
            .filter(|p| p.enabled)
            .map(|p| {
                let schedule = Self::parse_cron(&p.cron_expression)?;
                Ok((p, schedule))
            })
            .collect::<ChimeraResult<Vec<_>>>()?;
        Ok(Self { jobs, total })
    }

    /// Parse a cron expression string into a [`cron::Schedule`].
    pub fn parse_cron(cron_expr: &str) -> ChimeraResult<Schedule> {
        Schedule::from_str(cron_expr).map_err(|e| {
            ChimeraError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
        })
    }

    /// First fire time of `cron_expr` strictly after `after`.
    pub fn next_fire_time(cron_expr: &str, after: DateTime<Utc>) -> ChimeraResult<DateTime<Utc>> {
        let schedule = Self::parse_cron(cron_expr)?;
        schedule.after(&after).next().ok_or_else(|| {
            ChimeraError::Config(format!(
                "Cron expression '{cron_expr}' has no upcoming fire times"
            ))
        })
    }

    /// Jobs with at least one fire time in `(from, to]`. A job that fired
    /// several times in the window is returned once.
    pub fn due_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<&ScheduledPost> {
        self.jobs
            .iter()
            .filter(|(_, schedule)| schedule.after(&from).next().is_some_and(|t| t <= to))
            .map(|(post, _)| post)
            .collect()
    }

    pub fn enabled_jobs(&self) -> Vec<&ScheduledPost> {
        self.jobs.iter().map(|(post, _)| post).collect()
    }

    /// Total number of jobs (enabled and disabled).
    pub fn job_count(&self) -> usize {
        self.total
    }
}
