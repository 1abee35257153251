//! Error types produced by upload validation.
//!
//! All variants are typed, cloneable, and comparable so callers can map them
//! to HTTP status codes and assert on them in tests. Only `TooLarge` maps to
//! 413; the remaining validation failures are plain 400s, and an encode
//! failure after a successful decode is an internal fault (500).

use thiserror::Error;

/// Why an uploaded file was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UploadError {
    /// Raw upload exceeds the configured byte limit.
    #[error("upload of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    /// Neither content sniffing, the declared content type, nor the filename
    /// extension yielded an image type.
    #[error("unable to determine an image type for the upload")]
    UnknownType,

    /// Detected type is not in the raster-image allow-list.
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),

    /// Bytes carry an image signature but do not decode as a structurally
    /// valid image.
    #[error("corrupt or invalid image: {0}")]
    CorruptImage(String),

    /// Re-encoding the normalized image failed. Unlike the variants above
    /// this is not a client mistake.
    #[error("failed to encode normalized image: {0}")]
    Encode(String),
}

impl UploadError {
    /// True for rejections the uploader can correct.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Encode(_))
    }

    /// Suggested HTTP status code for this rejection.
    pub fn http_status_code(&self) -> u16 {
        match self {
            UploadError::TooLarge { .. } => 413,
            UploadError::Encode(_) => 500,
            _ => 400,
        }
    }
}
