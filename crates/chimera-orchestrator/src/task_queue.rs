use chimera_core::{keys, AgentTask, ChimeraResult, Priority, SharedClock, SystemClock};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

/// A task handed to a worker, owned by it until acked or the deadline passes.
#[derive(Debug, Clone)]
pub struct Lease {
    pub lease_id: Uuid,
    pub task: AgentTask,
    pub deadline: DateTime<Utc>,
}

struct LeaseRecord {
    task: AgentTask,
    deadline: DateTime<Utc>,
    /// Dequeue order, so reclaimed tasks keep their relative order.
    seq: u64,
}

#[derive(Default)]
struct Lanes {
    lanes: [VecDeque<AgentTask>; 3],
    leases: HashMap<Uuid, LeaseRecord>,
    next_seq: u64,
}

/// Three-lane priority queue with blocking dequeue and task leases.
///
/// Lane 1 is always drained before lane 2, and lane 2 before lane 3. Within
/// a lane tasks come out in the order they went in.
pub struct TaskQueue {
    agent_id: String,
    inner: Mutex<Lanes>,
    notify: Notify,
    clock: SharedClock,
    lease_duration: chrono::Duration,
}

impl TaskQueue {
    pub fn new(agent_id: impl Into<String>, lease_duration: Duration) -> Self {
        Self::with_clock(agent_id, lease_duration, SystemClock::shared())
    }

    pub fn with_clock(
        agent_id: impl Into<String>,
        lease_duration: Duration,
        clock: SharedClock,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            inner: Mutex::new(Lanes::default()),
            notify: Notify::new(),
            clock,
            lease_duration: chrono::Duration::from_std(lease_duration)
                .unwrap_or_else(|_| chrono::Duration::seconds(120)),
        }
    }

    /// Append a task to the lane for its priority.
    pub fn enqueue(&self, task: AgentTask) -> ChimeraResult<()> {
        let priority = task.validate()?;
        debug!(
            key = %keys::task_lane(&self.agent_id, priority),
            task_id = %task.id,
            task_type = %task.task_type(),
            "Task enqueued"
        );
        self.inner.lock().lanes[priority.lane()].push_back(task);
        self.notify.notify_one();
        Ok(())
    }

    /// Wait up to `timeout` for the highest-priority live task.
    ///
    /// Expired tasks found on the way are dropped. Cancel-safe: no task is
    /// taken unless this returns it.
    pub async fn dequeue(&self, timeout: Duration) -> Option<Lease> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(lease) = self.try_dequeue() {
                return Some(lease);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    /// Non-blocking variant of [`dequeue`](Self::dequeue).
    pub fn try_dequeue(&self) -> Option<Lease> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        for lane in 0..inner.lanes.len() {
            while let Some(task) = inner.lanes[lane].pop_front() {
                if task.is_expired(now) {
                    debug!(task_id = %task.id, lane = lane + 1, "Dropping expired task");
                    continue;
                }
                let lease_id = Uuid::new_v4();
                let deadline = now + self.lease_duration;
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.leases.insert(
                    lease_id,
                    LeaseRecord {
                        task: task.clone(),
                        deadline,
                        seq,
                    },
                );
                return Some(Lease {
                    lease_id,
                    task,
                    deadline,
                });
            }
        }
        None
    }

    /// Complete a lease. Returns `false` for unknown or already reclaimed leases.
    pub fn ack(&self, lease_id: Uuid) -> bool {
        self.inner.lock().leases.remove(&lease_id).is_some()
    }

    /// Push a lease's deadline out by one lease window.
    pub fn heartbeat(&self, lease_id: Uuid) -> bool {
        let deadline = self.clock.now() + self.lease_duration;
        match self.inner.lock().leases.get_mut(&lease_id) {
            Some(record) => {
                record.deadline = deadline;
                true
            }
            None => false,
        }
    }

    /// Requeue every task whose lease expired without an ack, at the front
    /// of its lane. Returns how many were reclaimed.
    pub fn reclaim_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let expired: Vec<Uuid> = inner
            .leases
            .iter()
            .filter(|(_, r)| r.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return 0;
        }

        let mut reclaimed: Vec<LeaseRecord> = expired
            .iter()
            .filter_map(|id| inner.leases.remove(id))
            .collect();
        // Latest first, so the earliest dequeued ends up at the very front.
        reclaimed.sort_by(|a, b| b.seq.cmp(&a.seq));
        let count = reclaimed.len();
        for record in reclaimed {
            let lane = Priority::try_from(record.task.priority)
                .map(Priority::lane)
                .unwrap_or(Priority::Low.lane());
            info!(task_id = %record.task.id, lane = lane + 1, "Reclaiming task with expired lease");
            inner.lanes[lane].push_front(record.task);
        }
        drop(inner);
        for _ in 0..count {
            self.notify.notify_one();
        }
        count
    }

    /// Number of queued tasks across all lanes (leased tasks excluded).
    pub fn len(&self) -> usize {
        self.inner.lock().lanes.iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lane_len(&self, priority: Priority) -> usize {
        self.inner.lock().lanes[priority.lane()].len()
    }

    /// Number of outstanding leases.
    pub fn in_flight(&self) -> usize {
        self.inner.lock().leases.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_core::{ChimeraError, Clock, ManualClock, Platform, TaskPayload};
    use std::sync::Arc;

    fn post(topic: &str, priority: Priority) -> AgentTask {
        AgentTask::new(
            TaskPayload::GeneratePost {
                topic: topic.into(),
                platform: Platform::X,
                context_hint: None,
            },
            priority,
            chrono::Duration::hours(1),
        )
    }

    fn topic(lease: &Lease) -> String {
        match &lease.task.payload {
            TaskPayload::GeneratePost { topic, .. } => topic.clone(),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    fn queue() -> TaskQueue {
        TaskQueue::new("nova", Duration::from_secs(120))
    }

    #[test]
    fn test_strict_priority_then_fifo() {
        let q = queue();
        q.enqueue(post("low", Priority::Low)).unwrap();
        q.enqueue(post("medium-a", Priority::Medium)).unwrap();
        q.enqueue(post("high", Priority::High)).unwrap();
        q.enqueue(post("medium-b", Priority::Medium)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| q.try_dequeue())
            .map(|l| topic(&l))
            .collect();
        assert_eq!(order, vec!["high", "medium-a", "medium-b", "low"]);
    }

    #[test]
    fn test_invalid_priority_is_rejected() {
        let q = queue();
        let mut task = post("x", Priority::High);
        task.priority = 4;
        assert!(matches!(
            q.enqueue(task),
            Err(ChimeraError::InvalidPriority(4))
        ));
        assert!(q.is_empty());
    }

    #[test]
    fn test_invalid_task_is_rejected() {
        let q = queue();
        let mut task = post("x", Priority::High);
        task.retry_count = task.max_retries + 1;
        assert!(matches!(q.enqueue(task), Err(ChimeraError::InvalidTask(_))));
    }

    #[test]
    fn test_expired_tasks_are_skipped() {
        let clock = ManualClock::new(Utc::now());
        let q = TaskQueue::with_clock("nova", Duration::from_secs(120), clock.shared());
        let short = AgentTask::new_at(
            TaskPayload::GeneratePost {
                topic: "stale".into(),
                platform: Platform::X,
                context_hint: None,
            },
            Priority::High,
            clock.now(),
            chrono::Duration::minutes(1),
        );
        q.enqueue(short).unwrap();
        let mut fresh = post("fresh", Priority::Low);
        fresh.created_at = clock.now();
        fresh.expires_at = clock.now() + chrono::Duration::hours(1);
        q.enqueue(fresh).unwrap();

        clock.advance(chrono::Duration::minutes(2));
        let lease = q.try_dequeue().unwrap();
        assert_eq!(topic(&lease), "fresh");
        assert!(q.try_dequeue().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let q = queue();
        let started = std::time::Instant::now();
        assert!(q.dequeue(Duration::from_millis(50)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_blocking_dequeue_wakes_on_enqueue() {
        let q = Arc::new(queue());
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.dequeue(Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.enqueue(post("wake", Priority::Medium)).unwrap();
        let lease = waiter.await.unwrap().unwrap();
        assert_eq!(topic(&lease), "wake");
    }

    #[test]
    fn test_ack_and_heartbeat_unknown_lease() {
        let q = queue();
        assert!(!q.ack(Uuid::new_v4()));
        assert!(!q.heartbeat(Uuid::new_v4()));

        q.enqueue(post("a", Priority::High)).unwrap();
        let lease = q.try_dequeue().unwrap();
        assert_eq!(q.in_flight(), 1);
        assert!(q.heartbeat(lease.lease_id));
        assert!(q.ack(lease.lease_id));
        assert!(!q.ack(lease.lease_id));
        assert_eq!(q.in_flight(), 0);
    }

    #[test]
    fn test_reclaim_requeues_at_lane_front_in_order() {
        let clock = ManualClock::new(Utc::now());
        let q = TaskQueue::with_clock("nova", Duration::from_secs(120), clock.shared());
        for name in ["first", "second", "third"] {
            let mut task = post(name, Priority::Medium);
            task.created_at = clock.now();
            task.expires_at = clock.now() + chrono::Duration::hours(1);
            q.enqueue(task).unwrap();
        }
        let first = q.try_dequeue().unwrap();
        let second = q.try_dequeue().unwrap();
        assert_eq!(topic(&first), "first");

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(q.reclaim_expired(), 0);
        // Keep the first lease alive; let the second lapse.
        assert!(q.heartbeat(first.lease_id));
        clock.advance(chrono::Duration::seconds(61));
        assert_eq!(q.reclaim_expired(), 1);

        let next = q.try_dequeue().unwrap();
        assert_eq!(topic(&next), "second");
        assert!(!q.ack(second.lease_id));
        assert_eq!(topic(&q.try_dequeue().unwrap()), "third");
    }

    #[test]
    fn test_reclaim_preserves_dequeue_order() {
        let clock = ManualClock::new(Utc::now());
        let q = TaskQueue::with_clock("nova", Duration::from_secs(10), clock.shared());
        for name in ["a", "b", "c"] {
            let mut task = post(name, Priority::High);
            task.created_at = clock.now();
            task.expires_at = clock.now() + chrono::Duration::hours(1);
            q.enqueue(task).unwrap();
        }
        q.try_dequeue().unwrap();
        q.try_dequeue().unwrap();
        clock.advance(chrono::Duration::seconds(11));
        assert_eq!(q.reclaim_expired(), 2);
        let order: Vec<String> = std::iter::from_fn(|| q.try_dequeue())
            .map(|l| topic(&l))
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
