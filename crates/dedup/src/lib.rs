//! Near-duplicate detection for incoming reports.
//!
//! Given a new report's category and approximate coordinates, the checker
//! asks the external issue store for recent issues nearby and decides
//! whether the report likely duplicates one of them. The decision is
//! advisory and fail-open: a store outage degrades to "treat as new" rather
//! than blocking submission.
//!
//! Distance is plain haversine over a mean-radius sphere: symmetric and
//! deterministic, which is all the contract asks of it.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

mod types;

pub use crate::types::{
    DedupConfig, DedupError, DedupOutcome, FeedError, IssueFeed, NearbyIssueSummary,
};

use std::sync::Arc;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two points, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// Checks a new report against recent nearby issues of the same category.
pub struct DedupChecker {
    feed: Arc<dyn IssueFeed>,
    config: DedupConfig,
}

impl DedupChecker {
    pub fn new(feed: Arc<dyn IssueFeed>, config: DedupConfig) -> Result<Self, DedupError> {
        config.validate()?;
        Ok(Self { feed, config })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    /// Decide whether a report at (`latitude`, `longitude`) in `category`
    /// likely duplicates an existing issue as of now.
    pub async fn check(&self, category: &str, latitude: f64, longitude: f64) -> DedupOutcome {
        self.check_at(category, latitude, longitude, Utc::now())
            .await
    }

    /// Clock-explicit variant of [`check`](Self::check).
    pub async fn check_at(
        &self,
        category: &str,
        latitude: f64,
        longitude: f64,
        now: DateTime<Utc>,
    ) -> DedupOutcome {
        let window = self.config.window();
        let candidates = match self
            .feed
            .recent_nearby(category, latitude, longitude, self.config.radius_m, window)
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(category, error = %err, "dedup_degraded");
                return DedupOutcome::Degraded {
                    reason: err.to_string(),
                };
            }
        };

        // The feed is allowed to over-return; the bounds are re-applied here
        // exactly before anything counts as a candidate.
        let cutoff = now - window;
        let mut best: Option<(f64, &NearbyIssueSummary)> = None;
        for candidate in &candidates {
            if candidate.category != category || candidate.created_at < cutoff {
                continue;
            }
            let distance = haversine_m(latitude, longitude, candidate.latitude, candidate.longitude);
            if distance > self.config.radius_m {
                continue;
            }
            best = match best {
                None => Some((distance, candidate)),
                Some((best_distance, best_candidate)) => {
                    if distance < best_distance
                        || (distance == best_distance
                            && candidate.created_at > best_candidate.created_at)
                    {
                        Some((distance, candidate))
                    } else {
                        Some((best_distance, best_candidate))
                    }
                }
            };
        }

        match best {
            Some((distance_m, candidate)) => {
                debug!(
                    category,
                    issue_id = candidate.id,
                    distance_m,
                    "dedup_likely_duplicate"
                );
                DedupOutcome::Likely {
                    issue_id: candidate.id,
                    distance_m,
                }
            }
            None => DedupOutcome::New,
        }
    }
}
