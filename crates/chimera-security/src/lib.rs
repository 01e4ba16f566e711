//! Publishing safeguards for the Chimera orchestration core.
//!
//! Provides the per-platform daily quota that guards every publish and the
//! append-only audit trail of validation and publishing decisions.
//!
//! # Main types
//!
//! - [`RateLimiter`]: Daily per-platform publish counters with a fixed UTC reset.
//! - [`Ticket`]: Proof that one publish slot was reserved.
//! - [`AuditLog`]: Append-only JSONL trail of judge and publisher decisions.

/// Decision audit logging.
pub mod audit;
/// Daily per-platform publish quotas.
pub mod rate_limit;

pub use audit::{AuditEntry, AuditLog, AuditOutcome};
pub use rate_limit::{RateLimitConfig, RateLimiter, Ticket};
