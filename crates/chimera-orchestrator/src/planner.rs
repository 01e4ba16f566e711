use crate::monitor::{Component, Counter, SwarmMonitor};
use crate::scheduler::ContentScheduler;
use crate::state::PlanningStore;
use crate::task_queue::TaskQueue;
use chimera_channels::{Mention, SignalSource, Trend};
use chimera_core::{
    keys, AgentTask, ChimeraError, ChimeraResult, Platform, Priority, SharedClock, TaskPayload,
};
use chimera_memory::TtlStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Trend posts go out on X first.
const TREND_PLATFORM: Platform = Platform::X;

/// What one planning cycle enqueued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    /// Set when the cycle did nothing because the budget is spent.
    pub skipped_no_budget: bool,
    pub new_trends: usize,
    pub replies: usize,
    /// Mentions already answered within the dedup window.
    pub duplicate_mentions: usize,
    pub scheduled: usize,
    pub enqueued: usize,
}

#[derive(Debug, Clone)]
pub struct PlannerSettings {
    pub task_ttl: chrono::Duration,
    pub mention_dedup_ttl: chrono::Duration,
    pub poll_deadline: Duration,
}

/// Turns signals and cron jobs into tasks.
pub struct Planner {
    agent_id: String,
    source: Arc<dyn SignalSource>,
    queue: Arc<TaskQueue>,
    state: Arc<PlanningStore>,
    dedup: Arc<dyn TtlStore>,
    scheduler: ContentScheduler,
    monitor: Arc<SwarmMonitor>,
    settings: PlannerSettings,
    clock: SharedClock,
    last_cycle: Mutex<DateTime<Utc>>,
}

impl Planner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        source: Arc<dyn SignalSource>,
        queue: Arc<TaskQueue>,
        state: Arc<PlanningStore>,
        dedup: Arc<dyn TtlStore>,
        scheduler: ContentScheduler,
        monitor: Arc<SwarmMonitor>,
        settings: PlannerSettings,
        clock: SharedClock,
    ) -> Self {
        let started = clock.now();
        Self {
            agent_id: agent_id.into(),
            source,
            queue,
            state,
            dedup,
            scheduler,
            monitor,
            settings,
            clock,
            last_cycle: Mutex::new(started),
        }
    }

    /// Run one planning cycle.
    ///
    /// Cron jobs are due if they fired after the previous cycle. Nothing is
    /// enqueued while the budget is spent; signal source failures only cost
    /// this cycle its signals.
    pub async fn plan_cycle(&self) -> ChimeraResult<PlanReport> {
        let now = self.clock.now();
        let since = std::mem::replace(&mut *self.last_cycle.lock(), now);
        self.monitor.record(Component::Planner, Counter::Processed);

        let (snapshot, version) = self.state.read().await?;
        let mut report = PlanReport::default();
        if snapshot.budget_remaining <= 0.0 {
            info!(agent_id = %self.agent_id, version, "Budget spent, skipping planning cycle");
            report.skipped_no_budget = true;
            return Ok(report);
        }

        let polled = tokio::time::timeout(self.settings.poll_deadline, self.source.poll())
            .await
            .map_err(|_| ChimeraError::Timeout(self.settings.poll_deadline))
            .and_then(|r| r);
        let signals = match polled {
            Ok(signals) => signals,
            Err(e) => {
                warn!(agent_id = %self.agent_id, error = %e, "Signal source unavailable, planning without signals");
                self.monitor.record(Component::Planner, Counter::Failed);
                Default::default()
            }
        };

        let known: HashSet<&str> = snapshot.trending_topics.iter().map(String::as_str).collect();
        let mut seen = HashSet::new();
        let fresh: Vec<&Trend> = signals
            .trends
            .iter()
            .filter(|t| !known.contains(t.topic.as_str()) && seen.insert(t.topic.as_str()))
            .collect();
        if !fresh.is_empty() {
            self.record_trends(&fresh).await;
        }
        for trend in fresh {
            report.new_trends += 1;
            report.enqueued += self.enqueue_trend(trend, now);
        }

        for mention in &signals.mentions {
            if self.first_sighting(mention).await {
                report.replies += 1;
                report.enqueued += self.enqueue(
                    TaskPayload::GenerateReply {
                        mention_id: mention.id.clone(),
                        author: mention.author.clone(),
                        text: mention.text.clone(),
                        platform: mention.platform,
                    },
                    Priority::High,
                    now,
                );
            } else {
                report.duplicate_mentions += 1;
            }
        }

        for post in self.scheduler.due_between(since, now) {
            if post.recently_posted(snapshot.last_post_timestamp, now) {
                info!(job = %post.name, "Skipping scheduled post, published recently");
                continue;
            }
            report.scheduled += 1;
            report.enqueued += self.enqueue(
                TaskPayload::GeneratePost {
                    topic: post.topic.clone(),
                    platform: post.platform,
                    context_hint: post.context_hint.clone(),
                },
                Priority::Low,
                now,
            );
        }

        info!(
            agent_id = %self.agent_id,
            new_trends = report.new_trends,
            replies = report.replies,
            scheduled = report.scheduled,
            enqueued = report.enqueued,
            queue_len = self.queue.len(),
            "Planning cycle complete"
        );
        self.monitor.record(Component::Planner, Counter::Succeeded);
        Ok(report)
    }

    /// Plan every `interval` until `shutdown` flips.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(agent_id = %self.agent_id, ?interval, "Planner started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    let planner = self.clone();
                    match tokio::spawn(async move { planner.plan_cycle().await }).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            warn!(agent_id = %self.agent_id, error = %e, "Planning cycle failed");
                            self.monitor.record(Component::Planner, Counter::Failed);
                        }
                        Err(e) => {
                            error!(agent_id = %self.agent_id, error = %e, "Planning cycle panicked");
                            self.monitor.record(Component::Planner, Counter::Panicked);
                        }
                    }
                }
            }
        }
        info!(agent_id = %self.agent_id, "Planner stopped");
    }

    async fn record_trends(&self, fresh: &[&Trend]) {
        let topics: Vec<String> = fresh.iter().map(|t| t.topic.clone()).collect();
        let outcome = self
            .state
            .update_with_retry(|s| {
                for topic in &topics {
                    s.push_trend(topic);
                }
            })
            .await;
        if let Err(e) = outcome {
            warn!(agent_id = %self.agent_id, count = topics.len(), error = %e, "Could not record trending topics");
        }
    }

    fn enqueue_trend(&self, trend: &Trend, now: DateTime<Utc>) -> usize {
        let mut enqueued = 0;
        if trend.articles.is_empty() {
            debug!(topic = %trend.topic, "Trend has no articles, skipping analysis");
        } else {
            enqueued += self.enqueue(
                TaskPayload::AnalyzeTrends {
                    articles: trend.articles.clone(),
                },
                Priority::Medium,
                now,
            );
        }
        let context_hint = trend.articles.first().map(|a| a.title.clone());
        enqueued += self.enqueue(
            TaskPayload::GeneratePost {
                topic: trend.topic.clone(),
                platform: TREND_PLATFORM,
                context_hint,
            },
            Priority::High,
            now,
        );
        enqueued
    }

    /// Claim the dedup marker for `mention`. A store failure counts as a
    /// first sighting.
    async fn first_sighting(&self, mention: &Mention) -> bool {
        let key = keys::mention(&self.agent_id, &mention.id);
        let marker = serde_json::json!({ "author": mention.author, "platform": mention.platform });
        match self
            .dedup
            .set_if_absent(&key, marker, self.settings.mention_dedup_ttl)
            .await
        {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(%key, error = %e, "Mention dedup unavailable");
                true
            }
        }
    }

    fn enqueue(&self, payload: TaskPayload, priority: Priority, now: DateTime<Utc>) -> usize {
        let task = AgentTask::new_at(payload, priority, now, self.settings.task_ttl);
        let task_id = task.id;
        let task_type = task.task_type();
        match self.queue.enqueue(task) {
            Ok(()) => {
                debug!(%task_id, %task_type, priority = priority.as_u8(), "Task enqueued");
                1
            }
            Err(e) => {
                warn!(%task_id, %task_type, error = %e, "Planner produced an invalid task");
                0
            }
        }
    }
}
