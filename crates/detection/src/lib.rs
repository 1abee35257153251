//! Zero-shot detection for civic report photos.
//!
//! This crate decides whether an uploaded photo actually shows the reported
//! problem. An external zero-shot classifier scores a fixed candidate
//! vocabulary; a [`LabelPolicy`] filters the scores down to positive labels
//! above a threshold and derives a binary [`Verdict`]. Results are cached
//! for a short TTL keyed by a content fingerprint so re-uploads of the same
//! photo do not hit the classifier twice.
//!
//! The whole layer is fail-open: a classifier outage, timeout, or malformed
//! response produces [`DetectionOutcome::Degraded`], which callers read as a
//! Negative verdict. Classification is advisory and never blocks a
//! submission.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod cache;
mod client;
mod error;
mod fingerprint;
mod labels;
mod schema;
mod stub;

pub use crate::cache::{CacheConfig, CacheKey, ResultCache};
pub use crate::client::{DetectionClient, DetectionConfig};
pub use crate::error::DetectionError;
pub use crate::fingerprint::{fingerprint_bytes, ContentFingerprint};
pub use crate::labels::LabelPolicy;

/// One label that survived threshold filtering, with its confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredLabel {
    pub label: String,
    pub confidence: f32,
}

/// Binary outcome of thresholding the positive labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Positive,
    Negative,
}

/// Interpreted classifier output for one (photo, policy) pair.
///
/// `labels` holds only positive labels scored strictly above the policy
/// threshold, in descending confidence order. Classification produces no
/// bounding boxes, so no box data exists here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
    pub policy_id: String,
    pub labels: Vec<ScoredLabel>,
    pub verdict: Verdict,
    pub computed_at: DateTime<Utc>,
}

impl DetectionResult {
    /// The "nothing detected" result, also used for degraded outcomes.
    pub fn negative(policy_id: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            labels: Vec::new(),
            verdict: Verdict::Negative,
            computed_at: Utc::now(),
        }
    }

    /// Apply a policy to raw classifier scores.
    pub fn from_scores(policy: &LabelPolicy, scores: Vec<ScoredLabel>) -> Self {
        let mut labels: Vec<ScoredLabel> = scores
            .into_iter()
            .filter(|s| policy.is_positive(&s.label) && s.confidence > policy.threshold)
            .collect();
        labels.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let verdict = if labels.is_empty() {
            Verdict::Negative
        } else {
            Verdict::Positive
        };

        Self {
            policy_id: policy.id.clone(),
            labels,
            verdict,
            computed_at: Utc::now(),
        }
    }

    pub fn is_positive(&self) -> bool {
        self.verdict == Verdict::Positive
    }
}

/// Result of asking the classifier, with the fail-open path in the type.
#[derive(Debug, Clone)]
pub enum DetectionOutcome {
    /// The classifier answered and the policy was applied.
    Classified(DetectionResult),
    /// The classifier was unreachable or unusable; callers treat this as a
    /// negative result. The error is kept for the operational log.
    Degraded {
        policy_id: String,
        error: DetectionError,
    },
}

impl DetectionOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, DetectionOutcome::Degraded { .. })
    }

    /// Collapse to the result the rest of the pipeline consumes.
    pub fn into_result(self) -> DetectionResult {
        match self {
            DetectionOutcome::Classified(result) => result,
            DetectionOutcome::Degraded { policy_id, .. } => DetectionResult::negative(policy_id),
        }
    }
}
