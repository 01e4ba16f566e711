use async_trait::async_trait;
use chimera_core::{ChimeraResult, SharedClock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Key-value storage where every key carries its own time-to-live.
#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> ChimeraResult<()>;

    /// Fetch a live value. Expired keys read as absent.
    async fn get(&self, key: &str) -> ChimeraResult<Option<serde_json::Value>>;

    /// Store `value` only if `key` has no live value. Returns whether it stored.
    async fn set_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> ChimeraResult<bool>;

    /// Drop expired keys, returning how many were removed.
    async fn purge_expired(&self) -> ChimeraResult<usize>;
}

struct TtlEntry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// In-memory [`TtlStore`] with lazy expiry on read and explicit purging.
pub struct InMemoryTtlStore {
    entries: Mutex<HashMap<String, TtlEntry>>,
    clock: SharedClock,
}

impl InMemoryTtlStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for InMemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlStore for InMemoryTtlStore {
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration) -> ChimeraResult<()> {
        let expires_at = self.clock.now() + ttl;
        self.entries
            .lock()
            .insert(key.to_string(), TtlEntry { value, expires_at });
        Ok(())
    }

    async fn get(&self, key: &str) -> ChimeraResult<Option<serde_json::Value>> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
    ) -> ChimeraResult<bool> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|e| e.expires_at > now) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            TtlEntry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn purge_expired(&self) -> ChimeraResult<usize> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        Ok(before - entries.len())
    }
}
