//! Storage capabilities for the Chimera orchestration core.
//!
//! The orchestrator never talks to a concrete database. It relies on three
//! capability traits, each satisfiable by any engine with expiry and
//! ordered-set primitives, plus in-memory implementations of each.
//!
//! # Main types
//!
//! - [`TtlStore`]: Key-value store with per-key expiry (mention deduplication).
//! - [`ShortTermStore`]: Episodic memory indexed by `(agent_id, timestamp)`.
//! - [`TimeOrderedSet`]: Members ordered by an instant (the HITL queue).

/// Episodic short-term memory.
pub mod episodic;
/// Time-ordered sets.
pub mod ordered;
/// Expiring key-value storage.
pub mod ttl;

pub use episodic::{EpisodicMemory, InMemoryShortTermStore, Interaction, ShortTermStore};
pub use ordered::{InMemoryTimeOrderedSet, TimeOrderedSet};
pub use ttl::{InMemoryTtlStore, TtlStore};
