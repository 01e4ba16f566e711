use crate::monitor::{Component, Counter, SwarmMonitor};
use crate::state::PlanningStore;
use chimera_channels::{PlatformPublisher, PublishRequest};
use chimera_core::validation::SAFETY_GATE;
use chimera_core::{ChimeraError, Decision, Platform, SharedClock, TaskResult, ValidationResult};
use chimera_memory::{Interaction, ShortTermStore};
use chimera_security::{AuditLog, AuditOutcome, RateLimiter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What happened to an approved result at the gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Local daily quota was used up; the content is dropped.
    Blocked,
    /// Dry run: quota was counted but the platform was not called.
    Simulated,
    Published { post_id: Option<String> },
    /// The platform refused for rate reasons; the local counter is now at cap.
    PlatformRateLimited,
    Failed { error_code: String },
    /// The result was not an approved, publishable draft, or its safety
    /// score is under the gate.
    Refused,
}

/// The only path to the platform publisher.
///
/// Reserves quota first; a reservation is never refunded, whatever happens
/// downstream.
pub struct PublisherGate {
    agent_id: String,
    publisher: Arc<dyn PlatformPublisher>,
    limiter: Arc<RateLimiter>,
    state: Arc<PlanningStore>,
    memory: Arc<dyn ShortTermStore>,
    audit: Arc<AuditLog>,
    monitor: Arc<SwarmMonitor>,
    clock: SharedClock,
    dry_run: bool,
    deadline: Duration,
    episodic_ttl: chrono::Duration,
}

/// Everything the gate needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub dry_run: bool,
    pub deadline: Duration,
    pub episodic_ttl: chrono::Duration,
}

impl PublisherGate {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agent_id: impl Into<String>,
        publisher: Arc<dyn PlatformPublisher>,
        limiter: Arc<RateLimiter>,
        state: Arc<PlanningStore>,
        memory: Arc<dyn ShortTermStore>,
        audit: Arc<AuditLog>,
        monitor: Arc<SwarmMonitor>,
        clock: SharedClock,
        settings: GateSettings,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            publisher,
            limiter,
            state,
            memory,
            audit,
            monitor,
            clock,
            dry_run: settings.dry_run,
            deadline: settings.deadline,
            episodic_ttl: settings.episodic_ttl,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub async fn publish(&self, result: &TaskResult, validation: &ValidationResult) -> PublishOutcome {
        let (platform, content) = match (result.platform, result.output.as_deref()) {
            (Some(platform), Some(content))
                if validation.decision == Decision::Approve
                    && validation.result_id == result.id
                    && validation.component_scores.safety >= SAFETY_GATE =>
            {
                (platform, content)
            }
            _ => {
                warn!(result_id = %result.id, decision = ?validation.decision, "Refusing to publish");
                return PublishOutcome::Refused;
            }
        };

        let ticket = match self.limiter.reserve(platform) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(result_id = %result.id, %platform, error = %e, "Quota exhausted, dropping content");
                self.finish(result, platform, AuditOutcome::Blocked, serde_json::json!({"reason": "quota_exceeded"}));
                return PublishOutcome::Blocked;
            }
        };

        if self.dry_run {
            info!(
                result_id = %result.id,
                %platform,
                sequence = ticket.sequence,
                content = %content,
                "[DRY RUN] Would publish"
            );
            self.finish(result, platform, AuditOutcome::Simulated, serde_json::json!({"sequence": ticket.sequence}));
            return PublishOutcome::Simulated;
        }

        let request = PublishRequest {
            content: content.to_string(),
            platform,
            dry_run: false,
        };
        let response = tokio::time::timeout(self.deadline, self.publisher.publish(&request))
            .await
            .map_err(|_| ChimeraError::Timeout(self.deadline))
            .and_then(|r| r);

        match response {
            Ok(resp) if resp.success => {
                info!(result_id = %result.id, %platform, post_id = ?resp.post_id, "Published");
                self.record_post(platform, content, resp.post_id.as_deref()).await;
                self.finish(result, platform, AuditOutcome::Published, serde_json::json!({"post_id": resp.post_id}));
                PublishOutcome::Published {
                    post_id: resp.post_id,
                }
            }
            Ok(resp) if resp.is_rate_limited() => {
                warn!(result_id = %result.id, %platform, "Platform reported rate limit, exhausting local quota");
                self.limiter.exhaust(platform);
                self.finish(result, platform, AuditOutcome::Blocked, serde_json::json!({"reason": "platform_rate_limited"}));
                PublishOutcome::PlatformRateLimited
            }
            Ok(resp) => {
                let error_code = resp.error_code.unwrap_or_else(|| "unknown".into());
                warn!(result_id = %result.id, %platform, %error_code, "Publish failed");
                self.finish(result, platform, AuditOutcome::Error, serde_json::json!({"error_code": error_code}));
                PublishOutcome::Failed { error_code }
            }
            Err(e) => {
                warn!(result_id = %result.id, %platform, error = %e, "Publish call failed");
                let error_code = e.to_string();
                self.finish(result, platform, AuditOutcome::Error, serde_json::json!({"error_code": error_code}));
                PublishOutcome::Failed { error_code }
            }
        }
    }

    async fn record_post(&self, platform: Platform, content: &str, post_id: Option<&str>) {
        let now = self.clock.now();
        if let Err(e) = self
            .state
            .update_with_retry(|s| s.last_post_timestamp = Some(now))
            .await
        {
            warn!(agent_id = %self.agent_id, error = %e, "Could not record last post time");
        }
        let interaction = Interaction::new("posted", content)
            .on(Some(platform))
            .with_metadata("post_id", serde_json::json!(post_id));
        if let Err(e) = self
            .memory
            .put(&self.agent_id, interaction, self.episodic_ttl)
            .await
        {
            warn!(agent_id = %self.agent_id, error = %e, "Could not record post in memory");
        }
    }

    fn finish(
        &self,
        result: &TaskResult,
        platform: Platform,
        outcome: AuditOutcome,
        details: serde_json::Value,
    ) {
        let counter = match outcome {
            AuditOutcome::Published | AuditOutcome::Simulated => Counter::Succeeded,
            _ => Counter::Failed,
        };
        self.monitor.record(Component::Publisher, Counter::Processed);
        self.monitor.record(Component::Publisher, counter);
        self.audit.log_publish(result.id, platform, outcome, details);
    }
}
