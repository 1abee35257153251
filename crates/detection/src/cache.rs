//! Short-TTL cache of classification results.
//!
//! Keyed by (policy, content fingerprint) so the same photo classified under
//! different policies occupies separate entries. Expired entries are treated
//! as absent and dropped on read; a best-effort sweep bounds memory when the
//! map grows past its cap. The cache makes no single-writer promise: two
//! concurrent misses may both classify, and the second `put` harmlessly
//! overwrites an equivalent result.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::fingerprint::ContentFingerprint;
use crate::DetectionResult;

/// TTL and capacity bounds for the result cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Seconds a stored result stays servable.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Soft cap on resident entries; exceeded entries are swept oldest-first.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn with_ttl_secs(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_max_entries() -> usize {
    4096
}

/// Cache key: which policy scored which content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub policy_id: String,
    pub fingerprint: ContentFingerprint,
}

impl CacheKey {
    pub fn new(policy_id: impl Into<String>, fingerprint: ContentFingerprint) -> Self {
        Self {
            policy_id: policy_id.into(),
            fingerprint,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: DetectionResult,
    stored_at: Instant,
}

/// Concurrent TTL cache of [`DetectionResult`]s.
#[derive(Debug)]
pub struct ResultCache {
    config: CacheConfig,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<DetectionResult> {
        self.get_at(key, Instant::now())
    }

    /// Clock-explicit read. An expired entry is absent; it is also removed
    /// so the map does not accumulate dead weight between sweeps.
    pub fn get_at(&self, key: &CacheKey, now: Instant) -> Option<DetectionResult> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                if now.duration_since(entry.stored_at) < self.config.ttl() {
                    return Some(entry.result.clone());
                }
                true
            }
            None => false,
        };
        // Guard dropped above; safe to take the write path now.
        if expired {
            self.entries.remove(key);
        }
        None
    }

    pub fn put(&self, key: CacheKey, result: DetectionResult) {
        self.put_at(key, result, Instant::now());
    }

    pub fn put_at(&self, key: CacheKey, result: DetectionResult, now: Instant) {
        self.entries.insert(key, CacheEntry { result, stored_at: now });
        if self.entries.len() > self.config.max_entries {
            self.sweep_at(now);
        }
    }

    /// Drop expired entries, then the oldest live ones until back under cap.
    fn sweep_at(&self, now: Instant) {
        let ttl = self.config.ttl();
        self.entries
            .retain(|_, entry| now.duration_since(entry.stored_at) < ttl);

        let over = self.entries.len().saturating_sub(self.config.max_entries);
        if over == 0 {
            return;
        }

        let mut by_age: Vec<(CacheKey, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().stored_at))
            .collect();
        by_age.sort_by_key(|(_, stored_at)| *stored_at);
        for (key, _) in by_age.into_iter().take(over) {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
