use std::time::Duration;

use thiserror::Error;

/// Failures while talking to the classification capability.
///
/// None of these ever escape the detection layer as an `Err`: the client
/// absorbs them into [`DetectionOutcome::Degraded`](crate::DetectionOutcome)
/// so a classifier outage can never block a submission. They exist as a
/// typed enum so the degradation reason is loggable and testable.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum DetectionError {
    /// Client configuration is unusable (e.g. api mode without a URL).
    #[error("invalid detection config: {0}")]
    InvalidConfig(String),

    /// Connection-level failure reaching the classifier.
    #[error("classifier request failed: {0}")]
    Transport(String),

    /// The bounded call exceeded its deadline.
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),

    /// Classifier answered with a non-success status.
    #[error("classifier returned HTTP {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// Response did not match the expected label/score schema.
    #[error("malformed classifier response: {0}")]
    MalformedResponse(String),
}
