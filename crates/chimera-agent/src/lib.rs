//! Language-model collaborators for the Chimera orchestration core.
//!
//! Generation and scoring are opaque to the orchestrator: it only sees the
//! typed request/response contracts defined here. The crate ships thin
//! adapters so a swarm can run end to end without an in-process model.
//!
//! # Main types
//!
//! - [`GenerationBackend`]: Drafts content for a task (worker side).
//! - [`HttpGenerationBackend`]: JSON-over-HTTP generation adapter.
//! - [`ContentScorer`]: Scores drafted content (judge side).
//! - [`RuleBasedScorer`]: Deterministic keyword and length based scorer.
//! - [`RetryPolicy`]: Exponential backoff shared by workers and judges.

/// Generation backends.
pub mod backends;
/// Retry and backoff policy.
pub mod retry;
/// Content scorers.
pub mod scorer;

pub use backends::http::{HttpBackendConfig, HttpGenerationBackend};
pub use backends::{GenerationBackend, GenerationContext, GenerationRequest, GenerationResponse};
pub use retry::{compute_backoff, retry_async, RetryPolicy};
pub use scorer::{ContentScorer, RuleBasedScorer, ScoreRequest, ScorerConfig};
