//! Admission control for report submissions.
//!
//! Every submission is charged against a sliding window of recent upload
//! events per identity key. Two windows run side by side in practice (one
//! keyed by user, one by client IP) and a request is admitted only when both
//! agree; see [`AdmissionGate`].
//!
//! Denial is a normal control-flow outcome, not an error: callers map
//! [`Admission::Denied`] to an HTTP 429 with the retry hint.
//!
//! All clock-sensitive entry points have an `_at` variant taking an explicit
//! [`Instant`] so tests can drive time deterministically.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Configuration for one sliding window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Maximum admitted events per identity inside the window.
    pub cap: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            cap: 5,
            window_secs: 3600,
        }
    }
}

impl AdmissionConfig {
    pub fn with_cap(mut self, cap: u32) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_window_secs(mut self, secs: u64) -> Self {
        self.window_secs = secs;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Outcome of a single admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Over cap; `retry_after` is the time until the oldest retained event
    /// leaves the window.
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed)
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Admission::Allowed => None,
            Admission::Denied { retry_after } => Some(*retry_after),
        }
    }
}

/// Counters for observability.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionStats {
    pub tracked_identities: usize,
    pub total_allowed: u64,
    pub total_denied: u64,
}

/// Sliding-window rate limiter keyed by identity string.
///
/// The per-identity event sequence lives in a [`DashMap`]; the entry guard
/// makes prune + count + append one atomic step per key, so concurrent
/// admissions for the same identity can never both slip past the cap.
/// Different identities never contend beyond the shard lock.
#[derive(Debug)]
pub struct SlidingWindow {
    config: AdmissionConfig,
    events: DashMap<String, VecDeque<Instant>>,
    total_allowed: AtomicU64,
    total_denied: AtomicU64,
}

impl SlidingWindow {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config,
            events: DashMap::new(),
            total_allowed: AtomicU64::new(0),
            total_denied: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Admit or deny one event for `identity` as of now.
    pub fn admit(&self, identity: &str) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// Clock-explicit variant of [`admit`](Self::admit). `now` must not move
    /// backwards for a given identity.
    pub fn admit_at(&self, identity: &str, now: Instant) -> Admission {
        let window = self.config.window();
        let cap = self.config.cap as usize;

        let mut entry = self.events.entry(identity.to_string()).or_default();
        let events = entry.value_mut();

        while let Some(&oldest) = events.front() {
            if now.duration_since(oldest) >= window {
                events.pop_front();
            } else {
                break;
            }
        }

        if events.len() >= cap {
            // cap >= 1 here, so front() is always present.
            let retry_after = events
                .front()
                .map(|&oldest| window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or(window);
            self.total_denied.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                identity,
                retry_after_secs = retry_after.as_secs(),
                "admission_denied"
            );
            return Admission::Denied { retry_after };
        }

        events.push_back(now);
        self.total_allowed.fetch_add(1, Ordering::Relaxed);
        Admission::Allowed
    }

    /// Remove the most recently charged event for `identity`.
    ///
    /// Used by [`AdmissionGate`] to refund the first gate when the second
    /// one denies. Timestamps charged close together are interchangeable, so
    /// popping the newest is a correct refund even under interleaving.
    fn revoke_last(&self, identity: &str) {
        if let Some(mut entry) = self.events.get_mut(identity) {
            entry.value_mut().pop_back();
        }
    }

    /// Drop identities whose entire history has aged out of the window, so
    /// the map stays bounded by the set of recently active identities.
    pub fn evict_idle(&self) {
        self.evict_idle_at(Instant::now());
    }

    pub fn evict_idle_at(&self, now: Instant) {
        let window = self.config.window();
        self.events.retain(|_, events| {
            events
                .back()
                .is_some_and(|&newest| now.duration_since(newest) < window)
        });
    }

    pub fn stats(&self) -> AdmissionStats {
        AdmissionStats {
            tracked_identities: self.events.len(),
            total_allowed: self.total_allowed.load(Ordering::Relaxed),
            total_denied: self.total_denied.load(Ordering::Relaxed),
        }
    }
}

/// Which window produced a gate denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateScope {
    User,
    Ip,
}

/// Outcome of consulting both windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied {
        scope: GateScope,
        retry_after: Duration,
    },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Per-user and per-IP windows combined with AND semantics: the request is
/// admitted only when both windows admit it. A denial by the second window
/// refunds the event already charged to the first, so a blocked request
/// never consumes capacity anywhere.
#[derive(Debug)]
pub struct AdmissionGate {
    per_user: SlidingWindow,
    per_ip: SlidingWindow,
}

impl AdmissionGate {
    pub fn new(user_config: AdmissionConfig, ip_config: AdmissionConfig) -> Self {
        Self {
            per_user: SlidingWindow::new(user_config),
            per_ip: SlidingWindow::new(ip_config),
        }
    }

    pub fn admit(&self, user_key: &str, ip_key: &str) -> GateDecision {
        self.admit_at(user_key, ip_key, Instant::now())
    }

    pub fn admit_at(&self, user_key: &str, ip_key: &str, now: Instant) -> GateDecision {
        match self.per_user.admit_at(user_key, now) {
            Admission::Denied { retry_after } => GateDecision::Denied {
                scope: GateScope::User,
                retry_after,
            },
            Admission::Allowed => match self.per_ip.admit_at(ip_key, now) {
                Admission::Allowed => GateDecision::Allowed,
                Admission::Denied { retry_after } => {
                    self.per_user.revoke_last(user_key);
                    GateDecision::Denied {
                        scope: GateScope::Ip,
                        retry_after,
                    }
                }
            },
        }
    }

    pub fn per_user(&self) -> &SlidingWindow {
        &self.per_user
    }

    pub fn per_ip(&self) -> &SlidingWindow {
        &self.per_ip
    }
}
