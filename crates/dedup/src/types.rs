use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Read projection of an existing issue, supplied by the external issue
/// store. Never owned or mutated here; only compared against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearbyIssueSummary {
    pub id: i64,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_at: DateTime<Utc>,
    pub status: String,
}

/// Proximity and recency bounds for the duplicate check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DedupConfig {
    /// Two reports within this many meters are proximity candidates.
    #[serde(default = "default_radius_m")]
    pub radius_m: f64,

    /// Only issues created within this many hours are considered.
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            radius_m: default_radius_m(),
            window_hours: default_window_hours(),
        }
    }
}

impl DedupConfig {
    pub fn with_radius_m(mut self, radius: f64) -> Self {
        self.radius_m = radius;
        self
    }

    pub fn with_window_hours(mut self, hours: u64) -> Self {
        self.window_hours = hours;
        self
    }

    pub fn window(&self) -> Duration {
        Duration::hours(self.window_hours as i64)
    }

    pub fn validate(&self) -> Result<(), DedupError> {
        if !(self.radius_m > 0.0) || !self.radius_m.is_finite() {
            return Err(DedupError::InvalidConfig(
                "radius_m must be positive and finite".into(),
            ));
        }
        if self.window_hours == 0 {
            return Err(DedupError::InvalidConfig(
                "window_hours must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_radius_m() -> f64 {
    100.0
}

fn default_window_hours() -> u64 {
    24
}

/// Advisory decision for a new report. The caller chooses what to do with a
/// `Likely` (block, merge, or just prompt the user); this layer never
/// mutates anything.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DedupOutcome {
    /// A recent nearby issue of the same category probably already covers
    /// this report.
    Likely { issue_id: i64, distance_m: f64 },
    New,
    /// The issue store could not be consulted. Duplicate suppression is a
    /// quality-of-life feature, so this behaves like `New` (fail-open).
    Degraded { reason: String },
}

impl DedupOutcome {
    pub fn is_likely_duplicate(&self) -> bool {
        matches!(self, DedupOutcome::Likely { .. })
    }
}

/// Errors raised by the checker itself (not by the store).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DedupError {
    #[error("invalid dedup config: {0}")]
    InvalidConfig(String),
}

/// Failures from the external issue store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum FeedError {
    #[error("issue feed query failed: {0}")]
    Query(String),
    #[error("issue feed unavailable: {0}")]
    Unavailable(String),
}

/// Read contract the external issue store must provide: issues of one
/// category created within `window`, near the given point. The feed may
/// over-return (e.g. a bounding-box query); the checker re-filters exactly.
#[async_trait]
pub trait IssueFeed: Send + Sync {
    async fn recent_nearby(
        &self,
        category: &str,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
        window: Duration,
    ) -> Result<Vec<NearbyIssueSummary>, FeedError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_policy() {
        let cfg = DedupConfig::default();
        assert_eq!(cfg.radius_m, 100.0);
        assert_eq!(cfg.window_hours, 24);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_radius_rejected() {
        let cfg = DedupConfig::default().with_radius_m(0.0);
        assert!(matches!(
            cfg.validate(),
            Err(DedupError::InvalidConfig(msg)) if msg.contains("radius_m")
        ));
    }

    #[test]
    fn zero_window_rejected() {
        let cfg = DedupConfig::default().with_window_hours(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let json = serde_json::to_value(DedupOutcome::Likely {
            issue_id: 7,
            distance_m: 42.5,
        })
        .unwrap();
        assert_eq!(json["outcome"], "likely");
        assert_eq!(json["issue_id"], 7);

        let json = serde_json::to_value(DedupOutcome::New).unwrap();
        assert_eq!(json["outcome"], "new");
    }
}
