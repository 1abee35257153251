//! Boundary validation for classifier responses.
//!
//! The classifier is an external capability; its response is validated
//! against a fixed schema (an array of `{"label": ..., "score": ...}`
//! objects) before any score is trusted. Anything else (wrong shape,
//! non-numeric or out-of-range scores) is a
//! [`DetectionError::MalformedResponse`] feeding the fail-open path.

use serde::Deserialize;
use serde_json::Value;

use crate::error::DetectionError;
use crate::ScoredLabel;

#[derive(Debug, Deserialize)]
struct WireScore {
    label: String,
    score: f32,
}

/// Parse and validate a raw classifier response into scored labels.
pub(crate) fn parse_scores(value: Value) -> Result<Vec<ScoredLabel>, DetectionError> {
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(DetectionError::MalformedResponse(format!(
                "expected an array of label scores, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut scores = Vec::with_capacity(items.len());
    for item in items {
        let wire: WireScore = serde_json::from_value(item)
            .map_err(|err| DetectionError::MalformedResponse(err.to_string()))?;
        if !wire.score.is_finite() || !(0.0..=1.0).contains(&wire.score) {
            return Err(DetectionError::MalformedResponse(format!(
                "score {} for label '{}' is outside [0, 1]",
                wire.score, wire.label
            )));
        }
        scores.push(ScoredLabel {
            label: wire.label,
            confidence: wire.score,
        });
    }
    Ok(scores)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a bool",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
