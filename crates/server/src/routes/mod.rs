use axum::extract::multipart::Field;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::net::SocketAddr;

use crate::error::ServerError;
use intake::RawUpload;

pub mod detect;
pub mod health;
pub mod reports;

/// API info endpoint
pub async fn api_info() -> impl IntoResponse {
    Json(json!({
        "service": "intake-server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "reports": "POST /api/v1/reports",
            "issues": "GET /api/v1/issues",
            "detect_vandalism": "POST /api/v1/detect-vandalism",
            "detect_flooding": "POST /api/v1/detect-flooding",
            "health": "GET /health",
        }
    }))
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "code": "NOT_FOUND",
                "message": "no such endpoint",
            }
        })),
    )
}

/// Client IP for the per-IP admission window: first `X-Forwarded-For` hop
/// when present (we sit behind a proxy in production), else the peer address.
pub(crate) fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

/// Read one multipart field into a raw upload, keeping the client's claims
/// about type and filename for the validator's fallback chain.
pub(crate) async fn image_from_field(field: Field<'_>) -> Result<RawUpload, ServerError> {
    let filename = field.file_name().map(str::to_string);
    let declared_content_type = field.content_type().map(str::to_string);
    let bytes = field
        .bytes()
        .await
        .map_err(|err| ServerError::BadRequest(format!("failed to read image field: {err}")))?;

    Ok(RawUpload {
        bytes: bytes.to_vec(),
        declared_content_type,
        filename,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.7, 10.0.0.1".parse().unwrap());
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        assert_eq!(client_ip(&headers, peer), "203.0.113.7");
    }

    #[test]
    fn peer_address_is_the_fallback() {
        let peer: SocketAddr = "192.0.2.4:1234".parse().unwrap();
        assert_eq!(client_ip(&HeaderMap::new(), peer), "192.0.2.4");
    }

    #[test]
    fn empty_forwarded_header_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "".parse().unwrap());
        let peer: SocketAddr = "192.0.2.4:1234".parse().unwrap();
        assert_eq!(client_ip(&headers, peer), "192.0.2.4");
    }
}
