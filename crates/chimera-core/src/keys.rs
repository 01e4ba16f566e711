//! Logical, storage-agnostic key layout.
//!
//! Backends that persist Chimera state (a Redis deployment, a SQL table, the
//! in-memory stores shipped with the workspace) address records with these
//! keys so all of them agree on a single naming scheme.

use crate::{Platform, Priority};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Task lane for one priority.
pub fn task_lane(agent_id: &str, priority: Priority) -> String {
    format!("agent:{agent_id}:tasks:p{}", priority.as_u8())
}

/// The versioned planning state of an agent.
pub fn planning_state(agent_id: &str) -> String {
    format!("agent:{agent_id}:planning_state")
}

/// Daily publish counter for a platform.
pub fn rate_limit(platform: Platform, date: NaiveDate) -> String {
    format!("ratelimit:{platform}:{date}")
}

/// Time-ordered set of escalated results awaiting review.
pub fn hitl_queue(agent_id: &str) -> String {
    format!("agent:{agent_id}:hitl")
}

/// One episodic memory entry.
pub fn episodic(agent_id: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "agent:{agent_id}:episodic:{}",
        timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
    )
}

/// Deduplication marker for an inbound mention.
pub fn mention(agent_id: &str, mention_id: &str) -> String {
    format!("agent:{agent_id}:mention:{mention_id}")
}
