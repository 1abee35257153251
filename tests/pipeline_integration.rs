//! End-to-end pipeline tests against the public API.
//!
//! The classifier runs in stub mode (deterministic, no network) and the
//! issue feed is a small in-memory store playing the persistence
//! collaborator's role: accepted reports get inserted, later submissions
//! see them through the dedup checker.

use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use intake::{
    haversine_m, AdmissionConfig, CandidateReport, DedupOutcome, FeedError, IngestionPipeline,
    IntakeConfig, IssueFeed, NearbyIssueSummary, RawUpload, RejectReason, SubmitterIdentity,
    Verdict,
};

/// In-memory issue feed standing in for the external store.
#[derive(Default)]
struct MemoryFeed {
    issues: Mutex<Vec<NearbyIssueSummary>>,
    next_id: AtomicI64,
}

impl MemoryFeed {
    fn insert(&self, category: &str, latitude: f64, longitude: f64) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.issues.lock().unwrap().push(NearbyIssueSummary {
            id,
            category: category.to_string(),
            latitude,
            longitude,
            created_at: Utc::now(),
            status: "open".to_string(),
        });
        id
    }
}

#[async_trait]
impl IssueFeed for MemoryFeed {
    async fn recent_nearby(
        &self,
        category: &str,
        latitude: f64,
        longitude: f64,
        radius_m: f64,
        window: Duration,
    ) -> Result<Vec<NearbyIssueSummary>, FeedError> {
        let cutoff = Utc::now() - window;
        Ok(self
            .issues
            .lock()
            .unwrap()
            .iter()
            .filter(|issue| {
                issue.category == category
                    && issue.created_at >= cutoff
                    && haversine_m(latitude, longitude, issue.latitude, issue.longitude)
                        <= radius_m
            })
            .cloned()
            .collect())
    }
}

fn image_bytes(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 223) as u8, (y % 227) as u8, ((x * y) % 229) as u8])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn report_with(
    category: &str,
    coords: Option<(f64, f64)>,
    image: Option<Vec<u8>>,
) -> CandidateReport {
    CandidateReport {
        description: "standing water across the lane".to_string(),
        category: category.to_string(),
        latitude: coords.map(|c| c.0),
        longitude: coords.map(|c| c.1),
        image: image.map(RawUpload::from_bytes),
    }
}

#[tokio::test]
async fn full_submission_runs_every_stage() {
    let feed = Arc::new(MemoryFeed::default());
    let pipeline = IngestionPipeline::new(IntakeConfig::default(), feed).unwrap();
    let identity = SubmitterIdentity::new("42", "203.0.113.5");

    let decision = pipeline
        .submit(
            &identity,
            report_with(
                "flooding",
                Some((18.52, 73.85)),
                Some(image_bytes(640, 480, image::ImageFormat::Jpeg)),
            ),
        )
        .await
        .unwrap();

    assert!(decision.accepted);
    assert!(decision.rejection.is_none());
    assert!(decision.fingerprint.is_some());
    // One result per configured policy, in order.
    assert_eq!(decision.detections.len(), 2);
    assert_eq!(decision.detections[0].policy_id, "vandalism");
    assert_eq!(decision.detections[1].policy_id, "flooding");
    // Empty store, so nothing to duplicate.
    assert_eq!(decision.dedup, Some(DedupOutcome::New));
}

#[tokio::test]
async fn oversized_photo_is_normalized_to_1024() {
    let pipeline =
        IngestionPipeline::new(IntakeConfig::default(), Arc::new(MemoryFeed::default())).unwrap();

    let decision = pipeline
        .submit(
            &SubmitterIdentity::new("42", "203.0.113.5"),
            report_with(
                "vandalism",
                None,
                Some(image_bytes(2048, 1024, image::ImageFormat::Jpeg)),
            ),
        )
        .await
        .unwrap();

    let image = decision.image.expect("normalized image");
    assert_eq!((image.width, image.height), (1024, 512));
    assert_eq!(image.mime_type, "image/jpeg");
}

#[tokio::test]
async fn sixth_upload_within_the_hour_is_denied() {
    let feed = Arc::new(MemoryFeed::default());
    let pipeline = IngestionPipeline::new(IntakeConfig::default(), feed).unwrap();
    let identity = SubmitterIdentity::new("user:42", "198.51.100.9");

    for _ in 0..5 {
        let decision = pipeline
            .submit(&identity, report_with("flooding", None, None))
            .await
            .unwrap();
        assert!(decision.accepted);
    }

    let sixth = pipeline
        .submit(&identity, report_with("flooding", None, None))
        .await
        .unwrap();
    assert!(!sixth.accepted);
    match sixth.rejection {
        Some(RejectReason::RateLimited { retry_after, .. }) => {
            // The window just filled, so the hint is essentially the full hour.
            assert!((3595..=3600).contains(&retry_after.as_secs()));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn repeat_upload_is_classified_once_within_ttl() {
    let pipeline =
        IngestionPipeline::new(IntakeConfig::default(), Arc::new(MemoryFeed::default())).unwrap();
    let bytes = image_bytes(320, 240, image::ImageFormat::Png);

    let first = pipeline
        .submit(
            &SubmitterIdentity::new("1", "203.0.113.1"),
            report_with("vandalism", None, Some(bytes.clone())),
        )
        .await
        .unwrap();
    let second = pipeline
        .submit(
            &SubmitterIdentity::new("2", "203.0.113.2"),
            report_with("vandalism", None, Some(bytes)),
        )
        .await
        .unwrap();

    // Same bytes, same fingerprint, and the cached results carry the first
    // computation's timestamp: the classifier ran once per policy.
    assert_eq!(first.fingerprint, second.fingerprint);
    assert_eq!(pipeline.result_cache().len(), pipeline.policies().len());
    for (a, b) in first.detections.iter().zip(second.detections.iter()) {
        assert_eq!(a.computed_at, b.computed_at);
        assert_eq!(a.labels, b.labels);
    }
}

#[tokio::test]
async fn nearby_repeat_report_is_flagged_as_duplicate() {
    let feed = Arc::new(MemoryFeed::default());
    let pipeline = IngestionPipeline::new(IntakeConfig::default(), feed.clone()).unwrap();

    // First report accepted; the collaborator persists it.
    let first = pipeline
        .submit(
            &SubmitterIdentity::new("1", "203.0.113.1"),
            report_with("flooding", Some((18.52, 73.85)), None),
        )
        .await
        .unwrap();
    assert!(first.accepted);
    assert_eq!(first.dedup, Some(DedupOutcome::New));
    let stored_id = feed.insert("flooding", 18.52, 73.85);

    // Second report ~33 m away within the window: likely duplicate.
    let second = pipeline
        .submit(
            &SubmitterIdentity::new("2", "203.0.113.2"),
            report_with("flooding", Some((18.5203, 73.85)), None),
        )
        .await
        .unwrap();
    assert!(second.accepted, "dedup is advisory, never a rejection");
    match second.dedup {
        Some(DedupOutcome::Likely {
            issue_id,
            distance_m,
        }) => {
            assert_eq!(issue_id, stored_id);
            assert!(distance_m < 100.0);
        }
        other => panic!("expected Likely, got {other:?}"),
    }

    // Different category at the same point: new issue.
    let third = pipeline
        .submit(
            &SubmitterIdentity::new("3", "203.0.113.3"),
            report_with("vandalism", Some((18.52, 73.85)), None),
        )
        .await
        .unwrap();
    assert_eq!(third.dedup, Some(DedupOutcome::New));
}

#[tokio::test]
async fn classifier_outage_never_blocks_submission() {
    let mut config = IntakeConfig::default();
    config.detection.client = config
        .detection
        .client
        .with_mode("api")
        .with_api_url("http://127.0.0.1:9")
        .with_timeout_secs(2);
    let pipeline = IngestionPipeline::new(config, Arc::new(MemoryFeed::default())).unwrap();

    let decision = pipeline
        .submit(
            &SubmitterIdentity::new("42", "203.0.113.5"),
            report_with(
                "vandalism",
                None,
                Some(image_bytes(64, 64, image::ImageFormat::Png)),
            ),
        )
        .await
        .unwrap();

    assert!(decision.accepted);
    for detection in &decision.detections {
        assert_eq!(detection.verdict, Verdict::Negative);
        assert!(detection.labels.is_empty());
    }
    // Degraded results are not cached, so recovery is picked up immediately.
    assert!(pipeline.result_cache().is_empty());
}

#[tokio::test]
async fn shared_ip_is_capped_across_users() {
    let mut config = IntakeConfig::default();
    config.admission.per_ip = AdmissionConfig::default().with_cap(2).with_window_secs(3600);
    let pipeline = IngestionPipeline::new(config, Arc::new(MemoryFeed::default())).unwrap();

    for user in ["a", "b"] {
        let decision = pipeline
            .submit(
                &SubmitterIdentity::new(user, "198.51.100.7"),
                report_with("flooding", None, None),
            )
            .await
            .unwrap();
        assert!(decision.accepted);
    }

    let third = pipeline
        .submit(
            &SubmitterIdentity::new("c", "198.51.100.7"),
            report_with("flooding", None, None),
        )
        .await
        .unwrap();
    assert!(!third.accepted);
    assert!(matches!(
        third.rejection,
        Some(RejectReason::RateLimited {
            scope: intake::GateScope::Ip,
            ..
        })
    ));
}
