//! Standalone detection endpoints.
//!
//! `POST /api/v1/detect-vandalism` and `POST /api/v1/detect-flooding` accept
//! a multipart `image` field, validate it, and return the scored labels for
//! the single policy. No admission charge and no dedup: these endpoints
//! exist so clients can preview what the classifier sees before submitting
//! a full report.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ServerError, ServerResult};
use crate::routes::image_from_field;
use crate::state::ServerState;
use intake::Verdict;

/// One detection on the wire. Classification produces no bounding boxes,
/// so `box` is always empty; the field is kept for client compatibility.
#[derive(Debug, Serialize)]
pub struct WireDetection {
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bounding_box: Vec<f32>,
}

#[derive(Debug, Serialize)]
pub struct DetectionResponse {
    pub verdict: Verdict,
    pub detections: Vec<WireDetection>,
}

pub async fn detect_vandalism(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ServerResult<Json<DetectionResponse>> {
    run_detection(state, multipart, "vandalism").await
}

pub async fn detect_flooding(
    State(state): State<Arc<ServerState>>,
    multipart: Multipart,
) -> ServerResult<Json<DetectionResponse>> {
    run_detection(state, multipart, "flooding").await
}

async fn run_detection(
    state: Arc<ServerState>,
    mut multipart: Multipart,
    policy_id: &str,
) -> ServerResult<Json<DetectionResponse>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some("image") {
            upload = Some(image_from_field(field).await?);
        }
    }
    let upload = upload
        .ok_or_else(|| ServerError::BadRequest("multipart field 'image' is required".to_string()))?;

    let decision = state.pipeline.classify_upload(upload, policy_id).await?;
    if let Some(reason) = decision.rejection {
        return Err(reason.into());
    }

    let result = decision
        .detections
        .into_iter()
        .next()
        .ok_or_else(|| ServerError::Internal("missing detection result".to_string()))?;

    Ok(Json(DetectionResponse {
        verdict: result.verdict,
        detections: result
            .labels
            .into_iter()
            .map(|l| WireDetection {
                label: l.label,
                confidence: l.confidence,
                bounding_box: Vec::new(),
            })
            .collect(),
    }))
}
