use chimera_core::{keys, ChimeraError, ChimeraResult, Platform, SharedClock, SystemClock};
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Daily publish caps per platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_x_cap")]
    pub x: u32,
    #[serde(default = "default_linkedin_cap")]
    pub linkedin: u32,
}

fn default_x_cap() -> u32 {
    50
}

fn default_linkedin_cap() -> u32 {
    25
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            x: default_x_cap(),
            linkedin: default_linkedin_cap(),
        }
    }
}

impl RateLimitConfig {
    pub fn cap(&self, platform: Platform) -> u32 {
        match platform {
            Platform::X => self.x,
            Platform::LinkedIn => self.linkedin,
        }
    }
}

/// A reserved publish slot. Consumed by the publisher gate right after issue;
/// never handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub platform: Platform,
    pub date: NaiveDate,
    /// Position of this reservation within the day (1-based).
    pub sequence: u32,
}

/// Per-platform daily counters that reset at the UTC date boundary.
pub struct RateLimiter {
    config: RateLimitConfig,
    counters: Mutex<HashMap<(Platform, NaiveDate), u32>>,
    clock: SharedClock,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, SystemClock::shared())
    }

    pub fn with_clock(config: RateLimitConfig, clock: SharedClock) -> Self {
        Self {
            config,
            counters: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    /// Daily cap configured for `platform`.
    pub fn cap(&self, platform: Platform) -> u32 {
        self.config.cap(platform)
    }

    /// Atomically claim one publish slot for today.
    ///
    /// If the count was already at the cap the counter is left untouched and
    /// [`ChimeraError::QuotaExceeded`] is returned.
    pub fn reserve(&self, platform: Platform) -> ChimeraResult<Ticket> {
        let today = self.today();
        let cap = self.cap(platform);
        let mut counters = self.counters.lock();
        // Past days can never be read again.
        counters.retain(|(_, date), _| *date >= today);

        let count = counters.entry((platform, today)).or_insert(0);
        if *count >= cap {
            warn!(
                key = %keys::rate_limit(platform, today),
                count = *count,
                cap,
                "Daily publish quota exhausted"
            );
            return Err(ChimeraError::QuotaExceeded { platform });
        }
        *count += 1;
        debug!(
            key = %keys::rate_limit(platform, today),
            count = *count,
            cap,
            "Publish slot reserved"
        );
        Ok(Ticket {
            platform,
            date: today,
            sequence: *count,
        })
    }

    /// Reservations made today.
    pub fn count(&self, platform: Platform) -> u32 {
        let today = self.today();
        self.counters
            .lock()
            .get(&(platform, today))
            .copied()
            .unwrap_or(0)
    }

    /// Slots left today.
    pub fn remaining(&self, platform: Platform) -> u32 {
        self.cap(platform).saturating_sub(self.count(platform))
    }

    /// Mark today's quota as used up, e.g. when the platform itself reports
    /// a rate limit the local counter had not reached yet.
    pub fn exhaust(&self, platform: Platform) {
        let today = self.today();
        let cap = self.cap(platform);
        let mut counters = self.counters.lock();
        let count = counters.entry((platform, today)).or_insert(0);
        *count = (*count).max(cap);
    }
}
