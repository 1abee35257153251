//! Ingestion & detection pipeline for civic issue reports.
//!
//! This umbrella crate stitches the stage crates into one fixed sequence per
//! submission:
//!
//! ```text
//! Received → RateChecked → Validated → Classified → DedupChecked → Decided
//! ```
//!
//! Admission and validation failures short-circuit straight to a rejected
//! [`Decision`]; classification and dedup are expensive and skipped.
//! Classification and dedup themselves never reject: a classifier outage
//! degrades to a negative verdict, a store outage degrades to "treat as
//! new", and both are visible only in the operational log and the outcome
//! types.
//!
//! The pipeline owns no durable state. Its only shared mutable pieces are
//! the admission windows and the result cache, both safe for concurrent
//! submissions; no lock is held across image decoding or the classifier
//! call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

mod config;

pub use crate::config::{AdmissionSection, ConfigLoadError, DetectionSection, IntakeConfig};

pub use admission::{
    Admission, AdmissionConfig, AdmissionGate, AdmissionStats, GateDecision, GateScope,
    SlidingWindow,
};
pub use dedup::{
    haversine_m, DedupChecker, DedupConfig, DedupError, DedupOutcome, FeedError, IssueFeed,
    NearbyIssueSummary,
};
pub use detection::{
    fingerprint_bytes, CacheConfig, CacheKey, ContentFingerprint, DetectionClient,
    DetectionConfig, DetectionError, DetectionOutcome, DetectionResult, LabelPolicy, ResultCache,
    ScoredLabel, Verdict,
};
pub use upload::{NormalizedImage, RawUpload, UploadConfig, UploadError};

/// Stages a submission moves through, in order. Used for tracing and for
/// naming where a rejection happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    RateChecked,
    Validated,
    Classified,
    DedupChecked,
    Decided,
}

/// Who is submitting: authenticated user id (or a stand-in) plus client IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitterIdentity {
    pub user: String,
    pub ip: String,
}

impl SubmitterIdentity {
    pub fn new(user: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            ip: ip.into(),
        }
    }

    /// Namespaced key for the per-user window.
    pub fn user_key(&self) -> String {
        format!("user:{}", self.user)
    }

    /// Namespaced key for the per-IP window.
    pub fn ip_key(&self) -> String {
        format!("ip:{}", self.ip)
    }
}

/// A report in flight. Created per request, destroyed once the pipeline
/// returns a [`Decision`]; never persisted here.
#[derive(Debug, Clone)]
pub struct CandidateReport {
    pub description: String,
    pub category: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image: Option<RawUpload>,
}

/// Why a submission was turned away.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    #[error("upload limit exceeded; retry in {} seconds", retry_after.as_secs())]
    RateLimited {
        scope: GateScope,
        retry_after: Duration,
    },

    #[error(transparent)]
    InvalidUpload(#[from] UploadError),
}

impl RejectReason {
    /// Suggested HTTP status for the boundary layer.
    pub fn http_status_code(&self) -> u16 {
        match self {
            RejectReason::RateLimited { .. } => 429,
            RejectReason::InvalidUpload(err) => err.http_status_code(),
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RejectReason::RateLimited { retry_after, .. } => Some(*retry_after),
            RejectReason::InvalidUpload(_) => None,
        }
    }
}

/// Terminal pipeline output for one submission.
///
/// On acceptance the normalized image (when present) is handed back so the
/// persistence collaborator can store it; detection results and the dedup
/// outcome are advisory data, never a rejection by themselves.
#[derive(Debug, Clone)]
pub struct Decision {
    pub accepted: bool,
    pub rejection: Option<RejectReason>,
    pub image: Option<NormalizedImage>,
    pub fingerprint: Option<ContentFingerprint>,
    pub detections: Vec<DetectionResult>,
    pub dedup: Option<DedupOutcome>,
}

impl Decision {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            rejection: Some(reason),
            image: None,
            fingerprint: None,
            detections: Vec::new(),
            dedup: None,
        }
    }

    pub fn positive_detections(&self) -> usize {
        self.detections.iter().filter(|d| d.is_positive()).count()
    }
}

/// Failures of the pipeline machinery itself. Submission outcomes,
/// including rejections, are [`Decision`]s, not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid detection setup: {0}")]
    Detection(#[from] DetectionError),

    #[error("invalid dedup setup: {0}")]
    Dedup(#[from] DedupError),

    #[error("unknown label policy: {0}")]
    UnknownPolicy(String),

    #[error("internal task failure: {0}")]
    Internal(String),
}

/// The ingestion pipeline. One instance serves all submissions.
pub struct IngestionPipeline {
    gate: AdmissionGate,
    upload_cfg: UploadConfig,
    client: DetectionClient,
    policies: Vec<LabelPolicy>,
    cache: ResultCache,
    checker: DedupChecker,
}

impl IngestionPipeline {
    /// Build a pipeline from configuration and the external issue feed.
    pub fn new(config: IntakeConfig, feed: Arc<dyn IssueFeed>) -> Result<Self, PipelineError> {
        for policy in &config.detection.policies {
            policy.validate()?;
        }
        let client = DetectionClient::new(config.detection.client)?;
        let checker = DedupChecker::new(feed, config.dedup)?;

        Ok(Self {
            gate: AdmissionGate::new(config.admission.per_user, config.admission.per_ip),
            upload_cfg: config.upload,
            client,
            policies: config.detection.policies,
            cache: ResultCache::new(config.cache),
            checker,
        })
    }

    pub fn policies(&self) -> &[LabelPolicy] {
        &self.policies
    }

    pub fn admission_gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn result_cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Run one submission through the full pipeline.
    pub async fn submit(
        &self,
        identity: &SubmitterIdentity,
        report: CandidateReport,
    ) -> Result<Decision, PipelineError> {
        let started = Instant::now();
        debug!(
            category = %report.category,
            user = %identity.user,
            stage = ?Stage::Received,
            "report_received"
        );

        if let GateDecision::Denied { scope, retry_after } =
            self.gate.admit(&identity.user_key(), &identity.ip_key())
        {
            info!(
                category = %report.category,
                user = %identity.user,
                stage = ?Stage::RateChecked,
                scope = ?scope,
                retry_after_secs = retry_after.as_secs(),
                "report_rejected"
            );
            return Ok(Decision::rejected(RejectReason::RateLimited {
                scope,
                retry_after,
            }));
        }

        let (image, fingerprint) = match report.image {
            None => (None, None),
            Some(raw) => match self.validate_image(raw).await? {
                Ok(image) => {
                    let fingerprint = fingerprint_bytes(&image.bytes);
                    (Some(image), Some(fingerprint))
                }
                Err(err) => {
                    info!(
                        category = %report.category,
                        user = %identity.user,
                        stage = ?Stage::Validated,
                        error = %err,
                        "report_rejected"
                    );
                    return Ok(Decision::rejected(RejectReason::InvalidUpload(err)));
                }
            },
        };

        let mut detections = Vec::with_capacity(self.policies.len());
        if let (Some(image), Some(fingerprint)) = (&image, &fingerprint) {
            for policy in &self.policies {
                detections.push(self.classify_image(image, fingerprint, policy).await);
            }
            debug!(
                stage = ?Stage::Classified,
                detections = detections.len(),
                "report_classified"
            );
        }

        let dedup = match (report.latitude, report.longitude) {
            (Some(latitude), Some(longitude)) => {
                let outcome = self
                    .checker
                    .check(&report.category, latitude, longitude)
                    .await;
                debug!(stage = ?Stage::DedupChecked, outcome = ?outcome, "report_dedup_checked");
                Some(outcome)
            }
            _ => None,
        };

        let decision = Decision {
            accepted: true,
            rejection: None,
            image,
            fingerprint,
            detections,
            dedup,
        };

        let elapsed_micros = started.elapsed().as_micros();
        info!(
            category = %report.category,
            user = %identity.user,
            stage = ?Stage::Decided,
            positive_detections = decision.positive_detections(),
            likely_duplicate = decision
                .dedup
                .as_ref()
                .is_some_and(DedupOutcome::is_likely_duplicate),
            elapsed_micros,
            "report_decided"
        );
        Ok(decision)
    }

    /// Validate and classify a photo under a single policy, without
    /// admission or dedup. Backs the standalone detection endpoints.
    pub async fn classify_upload(
        &self,
        raw: RawUpload,
        policy_id: &str,
    ) -> Result<Decision, PipelineError> {
        let policy = self
            .policies
            .iter()
            .find(|p| p.id == policy_id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownPolicy(policy_id.to_string()))?;

        match self.validate_image(raw).await? {
            Err(err) => Ok(Decision::rejected(RejectReason::InvalidUpload(err))),
            Ok(image) => {
                let fingerprint = fingerprint_bytes(&image.bytes);
                let result = self.classify_image(&image, &fingerprint, &policy).await;
                Ok(Decision {
                    accepted: true,
                    rejection: None,
                    image: Some(image),
                    fingerprint: Some(fingerprint),
                    detections: vec![result],
                    dedup: None,
                })
            }
        }
    }

    /// Decode/resize is CPU-bound; run it off the async workers.
    async fn validate_image(
        &self,
        raw: RawUpload,
    ) -> Result<Result<NormalizedImage, UploadError>, PipelineError> {
        let cfg = self.upload_cfg;
        tokio::task::spawn_blocking(move || upload::validate(raw, &cfg))
            .await
            .map_err(|err| PipelineError::Internal(err.to_string()))
    }

    async fn classify_image(
        &self,
        image: &NormalizedImage,
        fingerprint: &ContentFingerprint,
        policy: &LabelPolicy,
    ) -> DetectionResult {
        let key = CacheKey::new(policy.id.clone(), fingerprint.clone());
        if let Some(hit) = self.cache.get(&key) {
            debug!(policy_id = %policy.id, fingerprint = %fingerprint, "detection_cache_hit");
            return hit;
        }

        match self.client.classify(&image.bytes, policy).await {
            DetectionOutcome::Classified(result) => {
                self.cache.put(key, result.clone());
                result
            }
            // Degraded results are not cached: a transient outage must not
            // pin a negative verdict for the full TTL.
            outcome @ DetectionOutcome::Degraded { .. } => outcome.into_result(),
        }
    }
}
