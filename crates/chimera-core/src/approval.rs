//! Decision types for the human-in-the-loop (HITL) review step.
//!
//! These live in `chimera-core` so the orchestrator (which owns the review
//! queue) and any front end that collects reviewer input can share them
//! without depending on each other.

use serde::{Deserialize, Serialize};

/// The decision made by a human reviewer on an escalated result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanDecision {
    /// Whether the content may be published.
    pub approved: bool,
    /// Free-form justification.
    pub reason: Option<String>,
    /// Who made the call.
    pub reviewer: String,
}

impl HumanDecision {
    /// An approval by `reviewer`.
    pub fn approve(reviewer: impl Into<String>) -> Self {
        Self {
            approved: true,
            reason: None,
            reviewer: reviewer.into(),
        }
    }

    /// A rejection by `reviewer` with a reason.
    pub fn reject(reviewer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
            reviewer: reviewer.into(),
        }
    }
}
