//! Task orchestration for one Chimera agent.
//!
//! The planner turns signals and cron jobs into prioritized tasks, workers
//! draft content for them, judges score the drafts, and approved content
//! leaves through a rate-limited publisher gate. Borderline drafts wait for
//! a human in the HITL queue and are rejected if nobody answers in time.
//!
//! # Main types
//!
//! - [`Swarm`]: Wires every component and starts their loops independently.
//! - [`TaskQueue`]: Three priority lanes with leases and blocking dequeue.
//! - [`PlanningStore`]: Versioned planning state behind optimistic concurrency.
//! - [`WorkerDispatcher`]: Executes tasks against the generation backend.
//! - [`ValidationPipeline`]: Weighted scoring and approve/reject/escalate.
//! - [`HitlQueue`]: Escalations pending human review, with expiry.
//! - [`PublisherGate`]: The only path to the platform publisher.
//! - [`Planner`]: Periodic planning cycle.
//! - [`SwarmMonitor`]: Per-component counters and the health signal.

/// Swarm configuration.
pub mod config;
/// Component wiring and lifecycle.
pub mod engine;
/// Human-in-the-loop review queue.
pub mod hitl;
/// The judge.
pub mod judge;
/// Counters and health.
pub mod monitor;
/// Planning cycle.
pub mod planner;
/// Quota-gated publishing.
pub mod publisher;
/// Results awaiting a judge.
pub mod review_queue;
/// Cron-scheduled content jobs.
pub mod scheduler;
/// Planning state and OCC.
pub mod state;
/// Priority task queue with leases.
pub mod task_queue;
/// Worker dispatcher.
pub mod worker;

pub use config::SwarmConfig;
pub use engine::{Collaborators, ComponentHandle, Swarm};
pub use hitl::{HitlEntry, HitlQueue, HitlResolution};
pub use judge::{Dispatched, ValidationPipeline};
pub use monitor::{Component, ComponentMetrics, Counter, Health, SwarmMonitor};
pub use planner::{PlanReport, Planner, PlannerSettings};
pub use publisher::{GateSettings, PublishOutcome, PublisherGate};
pub use review_queue::ReviewQueue;
pub use scheduler::{ContentScheduler, ScheduledPost};
pub use state::{
    InMemoryStateBackend, PlanningState, PlanningStore, StateBackend, MAX_OCC_ATTEMPTS,
    MAX_TRENDING_TOPICS,
};
pub use task_queue::{Lease, TaskQueue};
pub use worker::{WorkerDispatcher, WorkerSettings};
