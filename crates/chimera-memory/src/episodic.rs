use async_trait::async_trait;
use chimera_core::{keys, ChimeraResult, Platform, SharedClock, SystemClock};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// What a component reports when something happened (a post went out, a
/// reply was drafted). The store stamps it into an [`EpisodicMemory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Interaction {
    pub interaction_type: String,
    pub content: String,
    pub platform: Option<Platform>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Interaction {
    pub fn new(interaction_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            interaction_type: interaction_type.into(),
            content: content.into(),
            platform: None,
            metadata: HashMap::new(),
        }
    }

    pub fn on(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// An immutable, self-expiring record of one interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicMemory {
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub interaction_type: String,
    pub content: String,
    pub platform: Option<Platform>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub expires_at: DateTime<Utc>,
}

impl EpisodicMemory {
    /// Storage key `(agent_id, timestamp)`.
    pub fn key(&self) -> String {
        keys::episodic(&self.agent_id, self.timestamp)
    }

    /// One-line rendering used for context injection, e.g.
    /// `[09:30] posted on x: shipping day`.
    pub fn summary(&self) -> String {
        let platform = self
            .platform
            .map(|p| format!(" on {p}"))
            .unwrap_or_default();
        format!(
            "[{}] {}{}: {}",
            self.timestamp.format("%H:%M"),
            self.interaction_type,
            platform,
            self.content
        )
    }
}

/// Episodic memory with automatic expiry.
///
/// Implementations must never return an entry whose TTL has elapsed, even
/// to readers racing with expiry.
#[async_trait]
pub trait ShortTermStore: Send + Sync {
    /// Record an interaction now, alive for `ttl`.
    async fn put(
        &self,
        agent_id: &str,
        interaction: Interaction,
        ttl: Duration,
    ) -> ChimeraResult<EpisodicMemory>;

    /// Live entries for `agent_id` inserted within the last `window`,
    /// newest first, at most `limit` of them.
    async fn get_recent(
        &self,
        agent_id: &str,
        window: Duration,
        limit: Option<usize>,
    ) -> ChimeraResult<Vec<EpisodicMemory>>;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> ChimeraResult<usize>;
}

type EpisodeIndex = (String, DateTime<Utc>, u64);

/// In-memory [`ShortTermStore`] ordered by `(agent_id, timestamp)`.
pub struct InMemoryShortTermStore {
    // The sequence number keeps two entries stamped in the same instant apart.
    entries: Mutex<(BTreeMap<EpisodeIndex, EpisodicMemory>, u64)>,
    clock: SharedClock,
}

impl InMemoryShortTermStore {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new((BTreeMap::new(), 0)),
            clock,
        }
    }
}

impl Default for InMemoryShortTermStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShortTermStore for InMemoryShortTermStore {
    async fn put(
        &self,
        agent_id: &str,
        interaction: Interaction,
        ttl: Duration,
    ) -> ChimeraResult<EpisodicMemory> {
        let now = self.clock.now();
        let memory = EpisodicMemory {
            agent_id: agent_id.to_string(),
            timestamp: now,
            interaction_type: interaction.interaction_type,
            content: interaction.content,
            platform: interaction.platform,
            metadata: interaction.metadata,
            expires_at: now + ttl,
        };
        let mut guard = self.entries.lock();
        let (entries, seq) = &mut *guard;
        *seq += 1;
        entries.insert((agent_id.to_string(), now, *seq), memory.clone());
        tracing::debug!(key = %memory.key(), "Episodic memory stored");
        Ok(memory)
    }

    async fn get_recent(
        &self,
        agent_id: &str,
        window: Duration,
        limit: Option<usize>,
    ) -> ChimeraResult<Vec<EpisodicMemory>> {
        let now = self.clock.now();
        let cutoff = now - window;
        let guard = self.entries.lock();
        let lower = (agent_id.to_string(), cutoff, 0);
        let upper = (agent_id.to_string(), now, u64::MAX);
        let recent = guard
            .0
            .range(lower..=upper)
            .rev()
            .map(|(_, m)| m)
            .filter(|m| m.expires_at > now)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(recent)
    }

    async fn purge_expired(&self) -> ChimeraResult<usize> {
        let now = self.clock.now();
        let mut guard = self.entries.lock();
        let before = guard.0.len();
        guard.0.retain(|_, m| m.expires_at > now);
        Ok(before - guard.0.len())
    }
}
