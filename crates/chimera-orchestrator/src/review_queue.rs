use chimera_core::TaskResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;

/// FIFO of task results waiting for a judge, shared by every validator.
#[derive(Default)]
pub struct ReviewQueue {
    results: Mutex<VecDeque<TaskResult>>,
    notify: Notify,
}

impl ReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: TaskResult) {
        self.results.lock().push_back(result);
        self.notify.notify_one();
    }

    /// Wait up to `timeout` for the oldest result.
    pub async fn pop(&self, timeout: Duration) -> Option<TaskResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(result) = self.results.lock().pop_front() {
                return Some(result);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
