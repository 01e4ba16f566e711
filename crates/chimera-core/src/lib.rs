//! Core types and error definitions for the Chimera orchestration core.
//!
//! This crate provides the foundational types shared across all Chimera crates:
//! the task and result records exchanged between the planner, the worker pool
//! and the judge, the validation record with its scoring rule, and the unified
//! error taxonomy.
//!
//! # Main types
//!
//! - [`ChimeraError`]: Unified error enum for all Chimera subsystems.
//! - [`ChimeraResult`]: Convenience alias for `Result<T, ChimeraError>`.
//! - [`AgentTask`]: A unit of work emitted by the planner.
//! - [`TaskResult`]: The outcome a worker produces for a task.
//! - [`ValidationResult`]: The judge's immutable verdict on a result.
//! - [`Clock`]: Injectable wall clock used by every time-dependent component.

/// Human review decision types.
pub mod approval;
/// Injectable clocks.
pub mod clock;
/// Logical storage keys.
pub mod keys;
/// Target social platforms.
pub mod platform;
/// Tasks, payloads and task results.
pub mod task;
/// Validation records and the confidence scoring rule.
pub mod validation;

pub use approval::HumanDecision;
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use platform::Platform;
pub use task::{AgentTask, Article, Priority, TaskPayload, TaskResult, TaskStatus, TaskType};
pub use validation::{
    ComponentScores, Decision, RejectionReason, ReviewState, ScoreComponent, ValidationResult,
    ValidationStage,
};

use std::time::Duration;

// --- Error types ---

/// Top-level error type for the Chimera orchestration core.
#[derive(Debug, thiserror::Error)]
pub enum ChimeraError {
    /// A collaborator failed in a way that may succeed on retry.
    #[error("Transient backend error: {0}")]
    TransientBackend(String),

    /// The request itself is invalid; retrying cannot help.
    #[error("Non-retryable input error: {0}")]
    NonRetryableInput(String),

    /// An OCC commit lost the race against another writer.
    #[error("OCC conflict: expected version {expected}, found {actual}")]
    Conflict {
        /// Version the writer based its mutation on.
        expected: u64,
        /// Version currently committed.
        actual: u64,
    },

    /// OCC retries were exhausted.
    #[error("State contention: gave up after {attempts} attempts")]
    StateContention {
        /// Number of commit attempts made.
        attempts: u32,
    },

    /// The daily publishing quota for a platform is used up.
    #[error("Daily quota exceeded for {platform}")]
    QuotaExceeded {
        /// Platform whose quota is exhausted.
        platform: Platform,
    },

    /// The shared-state or queue backing store is unreachable.
    #[error("Connectivity lost: {0}")]
    ConnectivityLoss(String),

    /// A task priority outside {1, 2, 3}.
    #[error("Invalid priority: {0} (expected 1, 2 or 3)")]
    InvalidPriority(u8),

    /// A task that violates its structural invariants.
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// A collaborator call exceeded its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChimeraError {
    /// Whether the operation that produced this error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChimeraError::TransientBackend(_)
                | ChimeraError::Timeout(_)
                | ChimeraError::ConnectivityLoss(_)
                | ChimeraError::Http(_)
        )
    }
}

/// A convenience `Result` alias using [`ChimeraError`].
pub type ChimeraResult<T> = Result<T, ChimeraError>;
