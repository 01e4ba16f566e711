//! Social platform boundary for the Chimera orchestration core.
//!
//! Outbound, the publisher gate talks to a [`PlatformPublisher`]. Inbound,
//! the planner polls a [`SignalSource`] for trending topics and mentions.
//! Both are thin adapters; no platform API semantics live here.

/// Outbound publishing.
pub mod publisher;
/// Inbound trend and mention signals.
pub mod signal;
/// JSON webhook publisher.
pub mod webhook;

pub use publisher::{PlatformPublisher, PublishRequest, PublishResponse, RATE_LIMIT_EXCEEDED};
pub use signal::{HttpSignalSource, InboxSignalSource, Mention, SignalSource, Signals, Trend};
pub use webhook::{WebhookConfig, WebhookPublisher};
