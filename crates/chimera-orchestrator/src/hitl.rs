use crate::monitor::{Component, Counter, SwarmMonitor};
use crate::publisher::{PublishOutcome, PublisherGate};
use crate::state::PlanningStore;
use chimera_core::{
    keys, ChimeraResult, HumanDecision, RejectionReason, SharedClock, TaskResult,
    ValidationResult,
};
use chimera_memory::TimeOrderedSet;
use chimera_security::AuditLog;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An escalated result awaiting a human.
#[derive(Debug, Clone)]
pub struct HitlEntry {
    pub result: TaskResult,
    /// The judge's escalation record.
    pub validation: ValidationResult,
    pub enqueued_at: DateTime<Utc>,
}

/// How a pending entry was resolved.
#[derive(Debug, Clone)]
pub struct HitlResolution {
    pub validation: ValidationResult,
    /// Set when an approval reached the publisher gate.
    pub publish: Option<PublishOutcome>,
}

/// Escalated results ordered by escalation time, auto-rejected after a
/// timeout.
///
/// A human decision and the timeout sweep race for each entry; removal from
/// the ordered set is the arbiter, so exactly one of them acts and the
/// other sees nothing.
pub struct HitlQueue {
    agent_id: String,
    order: Arc<dyn TimeOrderedSet>,
    entries: Mutex<HashMap<Uuid, HitlEntry>>,
    timeout: chrono::Duration,
    state: Arc<PlanningStore>,
    gate: Arc<PublisherGate>,
    audit: Arc<AuditLog>,
    monitor: Arc<SwarmMonitor>,
    clock: SharedClock,
}

impl HitlQueue {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        order: Arc<dyn TimeOrderedSet>,
        timeout: chrono::Duration,
        state: Arc<PlanningStore>,
        gate: Arc<PublisherGate>,
        audit: Arc<AuditLog>,
        monitor: Arc<SwarmMonitor>,
        clock: SharedClock,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            order,
            entries: Mutex::new(HashMap::new()),
            timeout,
            state,
            gate,
            audit,
            monitor,
            clock,
        }
    }

    /// Park an escalated result, stamped with the current time.
    pub async fn enqueue(&self, result: TaskResult, validation: ValidationResult) -> ChimeraResult<()> {
        let now = self.clock.now();
        let result_id = result.id;
        if !self.order.insert(&result_id.to_string(), now).await? {
            debug!(%result_id, "Result already awaiting review");
            return Ok(());
        }
        self.entries.lock().insert(
            result_id,
            HitlEntry {
                result,
                validation,
                enqueued_at: now,
            },
        );
        info!(key = %keys::hitl_queue(&self.agent_id), %result_id, "Escalated to human review");
        Ok(())
    }

    /// Apply a human decision. Returns `None` if the entry was already
    /// resolved (by another reviewer or the timeout sweep) or never existed.
    pub async fn decide(
        &self,
        result_id: Uuid,
        decision: HumanDecision,
    ) -> ChimeraResult<Option<HitlResolution>> {
        let Some(entry) = self.claim(result_id).await? else {
            debug!(%result_id, reviewer = %decision.reviewer, "Decision on resolved entry ignored");
            return Ok(None);
        };

        let validation = entry.validation.revalidate(
            decision.approved,
            Some(RejectionReason::HumanRejected),
            Some(decision.reviewer.clone()),
            self.occ_token(&entry).await,
            self.clock.now(),
        );
        info!(
            %result_id,
            reviewer = %decision.reviewer,
            approved = decision.approved,
            reason = ?decision.reason,
            "Human decision applied"
        );
        self.audit.log_validation(&validation);
        self.monitor.record(Component::Hitl, Counter::Processed);
        self.monitor.record(
            Component::Hitl,
            if decision.approved {
                Counter::Succeeded
            } else {
                Counter::Failed
            },
        );

        let publish = if decision.approved && entry.result.platform.is_some() {
            Some(self.gate.publish(&entry.result, &validation).await)
        } else {
            None
        };
        Ok(Some(HitlResolution {
            validation,
            publish,
        }))
    }

    /// Reject every entry that has waited at least the timeout as of `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> ChimeraResult<Vec<ValidationResult>> {
        let cutoff = now - self.timeout;
        let due = self.order.range_until(cutoff).await?;
        let mut rejected = Vec::new();
        for (member, _) in due {
            let Ok(result_id) = Uuid::parse_str(&member) else {
                warn!(%member, "Dropping malformed review entry");
                self.order.remove(&member).await?;
                continue;
            };
            let Some(entry) = self.claim(result_id).await? else {
                continue;
            };
            let validation = entry.validation.revalidate(
                false,
                Some(RejectionReason::HitlTimeout),
                None,
                self.occ_token(&entry).await,
                now,
            );
            warn!(%result_id, enqueued_at = %entry.enqueued_at, "Human review timed out, rejecting");
            self.audit.log_validation(&validation);
            self.monitor.record(Component::Hitl, Counter::Processed);
            self.monitor.record(Component::Hitl, Counter::Failed);
            rejected.push(validation);
        }
        Ok(rejected)
    }

    /// Pending entries, oldest first.
    pub async fn pending(&self) -> ChimeraResult<Vec<HitlEntry>> {
        let members = self.order.members().await?;
        let entries = self.entries.lock();
        Ok(members
            .iter()
            .filter_map(|(member, _)| Uuid::parse_str(member).ok())
            .filter_map(|id| entries.get(&id).cloned())
            .collect())
    }

    pub async fn len(&self) -> ChimeraResult<usize> {
        self.order.len().await
    }

    /// Sweep on a fixed interval until `shutdown` flips.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(agent_id = %self.agent_id, ?interval, "HITL sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    match self.sweep(self.clock.now()).await {
                        Ok(rejected) if !rejected.is_empty() => {
                            info!(count = rejected.len(), "HITL sweep rejected timed-out entries");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "HITL sweep failed"),
                    }
                }
            }
        }
        info!(agent_id = %self.agent_id, "HITL sweeper stopped");
    }

    /// Win the removal race for `result_id` and take its entry.
    async fn claim(&self, result_id: Uuid) -> ChimeraResult<Option<HitlEntry>> {
        if !self.order.remove(&result_id.to_string()).await? {
            return Ok(None);
        }
        Ok(self.entries.lock().remove(&result_id))
    }

    async fn occ_token(&self, entry: &HitlEntry) -> u64 {
        match self.state.read().await {
            Ok((_, version)) => version,
            Err(e) => {
                warn!(error = %e, "Planning state unreadable, reusing escalation token");
                entry.validation.occ_token
            }
        }
    }
}
