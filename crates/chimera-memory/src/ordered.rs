use async_trait::async_trait;
use chimera_core::ChimeraResult;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};

/// A set of string members, each scored by an instant and iterated in
/// score order.
#[async_trait]
pub trait TimeOrderedSet: Send + Sync {
    /// Add `member` at `at`. Returns `false` (and keeps the original score)
    /// if the member is already present.
    async fn insert(&self, member: &str, at: DateTime<Utc>) -> ChimeraResult<bool>;

    /// Remove `member`. Removing an absent member is not an error and
    /// returns `false`.
    async fn remove(&self, member: &str) -> ChimeraResult<bool>;

    /// Members scored at or before `cutoff`, oldest first.
    async fn range_until(&self, cutoff: DateTime<Utc>)
        -> ChimeraResult<Vec<(String, DateTime<Utc>)>>;

    /// Every member, oldest first.
    async fn members(&self) -> ChimeraResult<Vec<(String, DateTime<Utc>)>>;

    async fn len(&self) -> ChimeraResult<usize>;
}

#[derive(Default)]
struct OrderedInner {
    by_score: BTreeSet<(DateTime<Utc>, String)>,
    scores: HashMap<String, DateTime<Utc>>,
}

/// In-memory [`TimeOrderedSet`].
#[derive(Default)]
pub struct InMemoryTimeOrderedSet {
    inner: Mutex<OrderedInner>,
}

impl InMemoryTimeOrderedSet {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TimeOrderedSet for InMemoryTimeOrderedSet {
    async fn insert(&self, member: &str, at: DateTime<Utc>) -> ChimeraResult<bool> {
        let mut inner = self.inner.lock();
        if inner.scores.contains_key(member) {
            return Ok(false);
        }
        inner.scores.insert(member.to_string(), at);
        inner.by_score.insert((at, member.to_string()));
        Ok(true)
    }

    async fn remove(&self, member: &str) -> ChimeraResult<bool> {
        let mut inner = self.inner.lock();
        match inner.scores.remove(member) {
            Some(at) => {
                inner.by_score.remove(&(at, member.to_string()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn range_until(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ChimeraResult<Vec<(String, DateTime<Utc>)>> {
        let inner = self.inner.lock();
        Ok(inner
            .by_score
            .iter()
            .take_while(|(at, _)| *at <= cutoff)
            .map(|(at, member)| (member.clone(), *at))
            .collect())
    }

    async fn members(&self) -> ChimeraResult<Vec<(String, DateTime<Utc>)>> {
        let inner = self.inner.lock();
        Ok(inner
            .by_score
            .iter()
            .map(|(at, member)| (member.clone(), *at))
            .collect())
    }

    async fn len(&self) -> ChimeraResult<usize> {
        Ok(self.inner.lock().scores.len())
    }
}
