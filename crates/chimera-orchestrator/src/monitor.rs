use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Independently startable parts of the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Planner,
    Worker,
    Judge,
    Hitl,
    Publisher,
    Reaper,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Component::Planner => write!(f, "planner"),
            Component::Worker => write!(f, "worker"),
            Component::Judge => write!(f, "judge"),
            Component::Hitl => write!(f, "hitl"),
            Component::Publisher => write!(f, "publisher"),
            Component::Reaper => write!(f, "reaper"),
        }
    }
}

/// Operator-visible health of the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Health {
    Healthy,
    /// Shared state unreachable; components run on cached snapshots.
    Degraded,
    /// Shared state unreachable for too long; operator action needed.
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Processed,
    Succeeded,
    Failed,
    Retried,
    Panicked,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComponentMetrics {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
    pub panicked: u64,
}

impl ComponentMetrics {
    fn bump(&mut self, counter: Counter) {
        match counter {
            Counter::Processed => self.processed += 1,
            Counter::Succeeded => self.succeeded += 1,
            Counter::Failed => self.failed += 1,
            Counter::Retried => self.retried += 1,
            Counter::Panicked => self.panicked += 1,
        }
    }
}

/// Tracks per-component counters and the swarm health signal.
pub struct SwarmMonitor {
    metrics: Mutex<HashMap<Component, ComponentMetrics>>,
    health: watch::Sender<Health>,
}

impl SwarmMonitor {
    pub fn new() -> Self {
        let (health, _) = watch::channel(Health::Healthy);
        Self {
            metrics: Mutex::new(HashMap::new()),
            health,
        }
    }

    pub fn record(&self, component: Component, counter: Counter) {
        self.metrics
            .lock()
            .entry(component)
            .or_default()
            .bump(counter);
    }

    pub fn metrics(&self, component: Component) -> ComponentMetrics {
        self.metrics
            .lock()
            .get(&component)
            .cloned()
            .unwrap_or_default()
    }

    pub fn health(&self) -> Health {
        *self.health.borrow()
    }

    /// Receiver that observes every health transition.
    pub fn subscribe(&self) -> watch::Receiver<Health> {
        self.health.subscribe()
    }

    pub fn set_health(&self, next: Health) {
        let changed = self.health.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            match next {
                Health::Healthy => info!("Swarm health restored"),
                Health::Degraded => warn!("Swarm degraded: running on cached state"),
                Health::Fatal => error!("Swarm health fatal: shared state unreachable"),
            }
        }
    }

    /// Serialize the current state as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        let metrics = self.metrics.lock().clone();
        let components: serde_json::Map<String, serde_json::Value> = metrics
            .into_iter()
            .map(|(c, m)| {
                (
                    c.to_string(),
                    serde_json::to_value(m).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        serde_json::json!({
            "health": self.health(),
            "components": components,
        })
    }
}

impl Default for SwarmMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_per_component() {
        let monitor = SwarmMonitor::new();
        monitor.record(Component::Worker, Counter::Processed);
        monitor.record(Component::Worker, Counter::Succeeded);
        monitor.record(Component::Judge, Counter::Failed);
        assert_eq!(monitor.metrics(Component::Worker).processed, 1);
        assert_eq!(monitor.metrics(Component::Worker).succeeded, 1);
        assert_eq!(monitor.metrics(Component::Judge).failed, 1);
        assert_eq!(monitor.metrics(Component::Planner), ComponentMetrics::default());
    }

    #[tokio::test]
    async fn test_health_signal_notifies_on_change_only() {
        let monitor = SwarmMonitor::new();
        let mut rx = monitor.subscribe();
        monitor.set_health(Health::Healthy);
        assert!(!rx.has_changed().unwrap());
        monitor.set_health(Health::Degraded);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Health::Degraded);
    }

    #[test]
    fn test_to_json() {
        let monitor = SwarmMonitor::new();
        monitor.record(Component::Publisher, Counter::Succeeded);
        let json = monitor.to_json();
        assert_eq!(json["health"], "healthy");
        assert_eq!(json["components"]["publisher"]["succeeded"], 1);
    }
}
