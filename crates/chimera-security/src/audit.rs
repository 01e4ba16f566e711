use chimera_core::{Decision, Platform, ValidationResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub action: String,
    pub result_id: Uuid,
    pub details: serde_json::Value,
    pub outcome: AuditOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    Approved,
    Rejected,
    Escalated,
    Published,
    Simulated,
    Blocked,
    Error,
}

impl From<Decision> for AuditOutcome {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approve => AuditOutcome::Approved,
            Decision::Reject => AuditOutcome::Rejected,
            Decision::Escalate => AuditOutcome::Escalated,
        }
    }
}

/// Append-only audit log of every validation and publishing decision.
///
/// Each validation entry carries the `occ_token` of the planning state in
/// force, so an auditor can reconstruct which goals and budget applied.
pub struct AuditLog {
    agent_id: String,
    tx: Option<mpsc::UnboundedSender<AuditEntry>>,
}

impl AuditLog {
    /// Create a new AuditLog. Spawns a background task that appends entries
    /// to `<log_dir>/decisions.jsonl`.
    pub fn new(agent_id: impl Into<String>, log_dir: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEntry>();

        tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&log_dir).await {
                warn!(dir = %log_dir.display(), error = %e, "Audit log directory unavailable");
            }
            let log_file = log_dir.join("decisions.jsonl");
            let mut file = match tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_file)
                .await
            {
                Ok(file) => file,
                Err(e) => {
                    warn!(file = %log_file.display(), error = %e, "Audit log disabled");
                    return;
                }
            };

            while let Some(entry) = rx.recv().await {
                if let Ok(line) = serde_json::to_string(&entry) {
                    let line = format!("{line}\n");
                    let written = match file.write_all(line.as_bytes()).await {
                        Ok(()) => file.flush().await,
                        Err(e) => Err(e),
                    };
                    if let Err(e) = written {
                        warn!(error = %e, "Failed to append audit entry");
                    }
                }
            }
        });

        Self {
            agent_id: agent_id.into(),
            tx: Some(tx),
        }
    }

    /// An audit log that only emits tracing events.
    pub fn disabled(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            tx: None,
        }
    }

    pub fn log(&self, entry: AuditEntry) {
        info!(
            agent_id = %entry.agent_id,
            action = %entry.action,
            result_id = %entry.result_id,
            outcome = ?entry.outcome,
            "audit"
        );
        if let Some(tx) = &self.tx {
            let _ = tx.send(entry);
        }
    }

    /// Record a judge or HITL verdict.
    pub fn log_validation(&self, validation: &ValidationResult) {
        self.log(AuditEntry {
            timestamp: validation.created_at,
            agent_id: self.agent_id.clone(),
            action: "validation".into(),
            result_id: validation.result_id,
            details: serde_json::to_value(validation).unwrap_or(serde_json::Value::Null),
            outcome: validation.decision.into(),
        });
    }

    /// Record what happened when an approved result reached the publisher gate.
    pub fn log_publish(
        &self,
        result_id: Uuid,
        platform: Platform,
        outcome: AuditOutcome,
        details: serde_json::Value,
    ) {
        self.log(AuditEntry {
            timestamp: Utc::now(),
            agent_id: self.agent_id.clone(),
            action: format!("publish:{platform}"),
            result_id,
            details,
            outcome,
        });
    }
}
