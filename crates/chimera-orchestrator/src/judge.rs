use crate::hitl::HitlQueue;
use crate::monitor::{Component, Counter, SwarmMonitor};
use crate::publisher::{PublishOutcome, PublisherGate};
use crate::review_queue::ReviewQueue;
use crate::state::PlanningStore;
use chimera_agent::{retry_async, ContentScorer, RetryPolicy, ScoreRequest};
use chimera_core::{
    ChimeraError, ChimeraResult, ComponentScores, Decision, RejectionReason, SharedClock,
    TaskResult, TaskStatus, ValidationResult,
};
use chimera_security::AuditLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A validation verdict plus whatever the judge did with it.
#[derive(Debug, Clone)]
pub struct Dispatched {
    pub validation: ValidationResult,
    /// Set when an approval went through the publisher gate.
    pub publish: Option<PublishOutcome>,
}

/// The judge: scores task results, applies the decision rule and routes
/// approvals to the publisher gate and escalations to human review.
pub struct ValidationPipeline {
    agent_id: String,
    scorer: Arc<dyn ContentScorer>,
    state: Arc<PlanningStore>,
    hitl: Arc<HitlQueue>,
    gate: Arc<PublisherGate>,
    audit: Arc<AuditLog>,
    monitor: Arc<SwarmMonitor>,
    retry: RetryPolicy,
    deadline: Duration,
    clock: SharedClock,
}

impl ValidationPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        scorer: Arc<dyn ContentScorer>,
        state: Arc<PlanningStore>,
        hitl: Arc<HitlQueue>,
        gate: Arc<PublisherGate>,
        audit: Arc<AuditLog>,
        monitor: Arc<SwarmMonitor>,
        retry: RetryPolicy,
        deadline: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            scorer,
            state,
            hitl,
            gate,
            audit,
            monitor,
            retry,
            deadline,
            clock,
        }
    }

    /// Produce the single validation record for `result`.
    ///
    /// Failed tasks are rejected unscored. A scorer that stays unavailable
    /// after the retry policy rejects with zero scores.
    pub async fn validate(&self, result: &TaskResult) -> ValidationResult {
        self.monitor.record(Component::Judge, Counter::Processed);
        let occ_token = self.occ_token(result).await;

        let validation = match (result.status, result.output.as_deref()) {
            (TaskStatus::Success, Some(content)) => match self.score(result, content).await {
                Ok(scores) => {
                    ValidationResult::from_scores(result.id, scores, occ_token, self.clock.now())
                }
                Err(e) => {
                    warn!(result_id = %result.id, error = %e, "Scorer unavailable, rejecting");
                    ValidationResult::rejected(
                        result.id,
                        RejectionReason::ScorerUnavailable,
                        occ_token,
                        self.clock.now(),
                    )
                }
            },
            _ => {
                info!(result_id = %result.id, status = ?result.status, error = ?result.error, "Rejecting failed task");
                ValidationResult::rejected(
                    result.id,
                    RejectionReason::TaskFailed,
                    occ_token,
                    self.clock.now(),
                )
            }
        };

        info!(
            result_id = %result.id,
            decision = ?validation.decision,
            confidence = validation.confidence_score,
            occ_token = validation.occ_token,
            escalation_reason = ?validation.escalation_reason,
            rejection_reason = ?validation.rejection_reason,
            "Result validated"
        );
        self.audit.log_validation(&validation);
        self.monitor.record(
            Component::Judge,
            match validation.decision {
                Decision::Reject => Counter::Failed,
                Decision::Approve | Decision::Escalate => Counter::Succeeded,
            },
        );
        validation
    }

    /// Validate `result` and route it by decision.
    pub async fn dispatch(&self, result: TaskResult) -> ChimeraResult<Dispatched> {
        let validation = self.validate(&result).await;
        let publish = match validation.decision {
            Decision::Approve if result.platform.is_some() => {
                Some(self.gate.publish(&result, &validation).await)
            }
            Decision::Approve => {
                info!(result_id = %result.id, "Approved result has no platform, nothing to publish");
                None
            }
            Decision::Escalate => {
                self.hitl.enqueue(result, validation.clone()).await?;
                None
            }
            Decision::Reject => None,
        };
        Ok(Dispatched {
            validation,
            publish,
        })
    }

    /// Validate results from `review` until `shutdown` flips.
    pub async fn run(
        self: Arc<Self>,
        judge_id: String,
        review: Arc<ReviewQueue>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(agent_id = %self.agent_id, %judge_id, "Judge started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                result = review.pop(POLL_INTERVAL) => {
                    let Some(result) = result else { continue };
                    let result_id = result.id;
                    let judge = self.clone();
                    match tokio::spawn(async move { judge.dispatch(result).await }).await {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            error!(%judge_id, %result_id, error = %e, "Could not route validated result");
                        }
                        Err(e) => {
                            error!(%judge_id, %result_id, error = %e, "Judge iteration panicked");
                            self.monitor.record(Component::Judge, Counter::Panicked);
                        }
                    }
                }
            }
        }
        info!(agent_id = %self.agent_id, %judge_id, "Judge stopped");
    }

    async fn score(&self, result: &TaskResult, content: &str) -> ChimeraResult<ComponentScores> {
        let request = ScoreRequest {
            content: content.to_string(),
            platform: result.platform,
        };
        let deadline = self.deadline;
        retry_async(&self.retry, "content_scorer", || async {
            tokio::time::timeout(deadline, self.scorer.score(&request))
                .await
                .map_err(|_| ChimeraError::Timeout(deadline))?
        })
        .await
    }

    async fn occ_token(&self, result: &TaskResult) -> u64 {
        match self.state.read().await {
            Ok((_, version)) => version,
            Err(e) => {
                warn!(result_id = %result.id, error = %e, "Planning state unreadable, using worker's version");
                result.state_version
            }
        }
    }
}
