//! In-memory issue store.
//!
//! Stands in for the real persistence layer behind two narrow contracts:
//! the [`IssueFeed`] read projection the dedup checker queries, and the
//! write path accepted decisions feed into. Nothing here survives a restart.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use intake::{haversine_m, FeedError, IssueFeed, NearbyIssueSummary};

/// A persisted issue row.
#[derive(Debug, Clone, Serialize)]
pub struct StoredIssue {
    pub id: i64,
    pub description: String,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    /// Fingerprint of the stored photo, when the report carried one.
    pub image_fingerprint: Option<String>,
}

/// New-issue payload for [`InMemoryIssueStore::insert`].
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub description: String,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_fingerprint: Option<String>,
}

#[derive(Debug)]
pub struct InMemoryIssueStore {
    next_id: AtomicI64,
    issues: RwLock<Vec<StoredIssue>>,
}

impl Default for InMemoryIssueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryIssueStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            issues: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, new: NewIssue) -> StoredIssue {
        let issue = StoredIssue {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            description: new.description,
            category: new.category,
            latitude: new.latitude,
            longitude: new.longitude,
            status: "open".to_string(),
            created_at: Utc::now(),
            image_fingerprint: new.image_fingerprint,
        };
        let mut issues = self.issues.write().unwrap_or_else(|p| p.into_inner());
        issues.push(issue.clone());
        issue
    }

    pub fn list(&self) -> Vec<StoredIssue> {
        let issues = self.issues.read().unwrap_or_else(|p| p.into_inner());
        issues.clone()
    }

    pub fn len(&self) -> usize {
        let issues = self.issues.read().unwrap_or_else(|p| p.into_inner());
        issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl IssueFeed for InMemoryIssueStore {
    async fn recent_nearby(
        &self,
        category: &str,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
        window: Duration,
    ) -> Result<Vec<NearbyIssueSummary>, FeedError> {
        let cutoff = Utc::now() - window;
        let issues = self.issues.read().unwrap_or_else(|p| p.into_inner());
        Ok(issues
            .iter()
            .filter(|issue| issue.category == category && issue.created_at >= cutoff)
            .filter_map(|issue| {
                let (lat, lon) = (issue.latitude?, issue.longitude?);
                if haversine_m(latitude, longitude, lat, lon) > radius_m {
                    return None;
                }
                Some(NearbyIssueSummary {
                    id: issue.id,
                    category: issue.category.clone(),
                    latitude: lat,
                    longitude: lon,
                    created_at: issue.created_at,
                    status: issue.status.clone(),
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_issue(category: &str, latitude: f64, longitude: f64) -> NewIssue {
        NewIssue {
            description: "test".to_string(),
            category: category.to_string(),
            latitude: Some(latitude),
            longitude: Some(longitude),
            image_fingerprint: None,
        }
    }

    #[test]
    fn insert_assigns_sequential_ids_and_open_status() {
        let store = InMemoryIssueStore::new();
        let a = store.insert(new_issue("flooding", 18.52, 73.85));
        let b = store.insert(new_issue("vandalism", 18.52, 73.85));

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(a.status, "open");
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn feed_filters_by_category_and_distance() {
        let store = InMemoryIssueStore::new();
        store.insert(new_issue("flooding", 18.5203, 73.85)); // ~33 m away
        store.insert(new_issue("vandalism", 18.5203, 73.85)); // wrong category
        store.insert(new_issue("flooding", 18.54, 73.85)); // ~2.2 km away
        store.insert(NewIssue {
            latitude: None,
            longitude: None,
            ..new_issue("flooding", 0.0, 0.0)
        }); // no coordinates

        let nearby = store
            .recent_nearby("flooding", 18.52, 73.85, 100.0, Duration::hours(24))
            .await
            .unwrap();

        assert_eq!(nearby.len(), 1);
        assert_eq!(nearby[0].id, 1);
    }
}
