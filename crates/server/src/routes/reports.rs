//! Report submission and listing.
//!
//! `POST /api/v1/reports` takes a multipart form (description, category,
//! optional coordinates, optional photo), runs it through the ingestion
//! pipeline, and on acceptance writes the issue to the store. Pipeline
//! rejections become typed HTTP errors; detection results and the dedup
//! outcome ride along in the response as advisory data.

use axum::extract::{ConnectInfo, Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::error::{ServerError, ServerResult};
use crate::routes::{client_ip, image_from_field};
use crate::state::ServerState;
use crate::store::{NewIssue, StoredIssue};
use intake::{CandidateReport, DedupOutcome, DetectionResult, SubmitterIdentity};

/// Response for an accepted report.
#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub issue: StoredIssue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub detections: Vec<DetectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup: Option<DedupOutcome>,
}

/// Create a new issue report.
pub async fn create_report(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ServerResult<impl IntoResponse> {
    let mut description: Option<String> = None;
    let mut category: Option<String> = None;
    let mut latitude: Option<f64> = None;
    let mut longitude: Option<f64> = None;
    let mut user: Option<String> = None;
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ServerError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        match field.name() {
            Some("description") => description = Some(read_text(field).await?),
            Some("category") => category = Some(read_text(field).await?),
            Some("latitude") => latitude = Some(read_coordinate(field, "latitude").await?),
            Some("longitude") => longitude = Some(read_coordinate(field, "longitude").await?),
            Some("user_email") => user = Some(read_text(field).await?),
            Some("image") => image = Some(image_from_field(field).await?),
            // Unknown fields are ignored so clients can evolve ahead of us.
            _ => {}
        }
    }

    let description = description
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("description is required".to_string()))?;
    let category = category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ServerError::BadRequest("category is required".to_string()))?;
    if latitude.is_some() != longitude.is_some() {
        return Err(ServerError::BadRequest(
            "latitude and longitude must be provided together".to_string(),
        ));
    }

    let identity = SubmitterIdentity::new(
        user.unwrap_or_else(|| "anonymous".to_string()),
        client_ip(&headers, peer),
    );
    let report = CandidateReport {
        description: description.clone(),
        category: category.clone(),
        latitude,
        longitude,
        image,
    };

    let decision = state.pipeline.submit(&identity, report).await?;
    if let Some(reason) = decision.rejection {
        return Err(reason.into());
    }

    let fingerprint = decision.fingerprint.map(|f| f.to_string());
    let issue = state.store.insert(NewIssue {
        description,
        category,
        latitude,
        longitude,
        image_fingerprint: fingerprint.clone(),
    });

    Ok((
        StatusCode::CREATED,
        Json(ReportResponse {
            issue,
            fingerprint,
            detections: decision.detections,
            dedup: decision.dedup,
        }),
    ))
}

/// List stored issues.
pub async fn list_issues(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let issues = state.store.list();
    Json(json!({
        "total": issues.len(),
        "issues": issues,
    }))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ServerResult<String> {
    field
        .text()
        .await
        .map_err(|err| ServerError::BadRequest(format!("invalid text field: {err}")))
}

async fn read_coordinate(
    field: axum::extract::multipart::Field<'_>,
    name: &str,
) -> ServerResult<f64> {
    let raw = read_text(field).await?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ServerError::BadRequest(format!("{name} must be a number, got '{raw}'")))
}
