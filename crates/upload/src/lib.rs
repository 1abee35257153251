//! Photo upload validation and normalization.
//!
//! Raw bytes from the HTTP boundary go through a fixed check sequence that
//! short-circuits on the first failure:
//!
//! 1. **Size**: raw length against the configured cap.
//! 2. **Type**: magic-number sniffing, with declared content type and
//!    filename extension as fallbacks only ([`sniff`]).
//! 3. **Allow-list**: JPEG, PNG, GIF, WEBP, BMP, TIFF.
//! 4. **Integrity**: the bytes must fully decode.
//! 5. **Normalization**: images larger than `max_dimension` on either side
//!    are downscaled (Lanczos3, aspect ratio preserved) and re-encoded;
//!    JPEG output uses the configured quality.
//!
//! Validation is a pure value transformation from [`RawUpload`] to
//! [`NormalizedImage`]: no shared state is touched, so any number of
//! validations can run concurrently. The decode/resize step is CPU-bound and
//! callers on an async runtime should wrap [`validate`] in a blocking task.

use std::io::Cursor;
use std::time::Instant;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::{info, warn};

mod config;
mod error;
mod sniff;

pub use crate::config::UploadConfig;
pub use crate::error::UploadError;

/// An upload exactly as it arrived: bytes plus whatever the client claimed
/// about them. The claims are advisory; the bytes decide.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub bytes: Vec<u8>,
    pub declared_content_type: Option<String>,
    pub filename: Option<String>,
}

impl RawUpload {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            declared_content_type: None,
            filename: None,
        }
    }
}

/// A validated, decoded, possibly downscaled photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Canonical MIME type of `bytes` (e.g. `image/jpeg`).
    pub mime_type: String,
}

/// Validate an upload and produce its normalized form.
pub fn validate(upload: RawUpload, cfg: &UploadConfig) -> Result<NormalizedImage, UploadError> {
    let start = Instant::now();
    let declared = upload.declared_content_type.clone();
    let filename = upload.filename.clone();
    let raw_bytes = upload.bytes.len();

    match validate_inner(upload, cfg) {
        Ok(image) => {
            let elapsed_micros = start.elapsed().as_micros();
            info!(
                mime_type = %image.mime_type,
                width = image.width,
                height = image.height,
                raw_bytes,
                normalized_bytes = image.bytes.len(),
                elapsed_micros,
                "upload_accepted"
            );
            Ok(image)
        }
        Err(err) => {
            let elapsed_micros = start.elapsed().as_micros();
            warn!(
                error = %err,
                declared_content_type = ?declared,
                filename = ?filename,
                raw_bytes,
                elapsed_micros,
                "upload_rejected"
            );
            Err(err)
        }
    }
}

fn validate_inner(upload: RawUpload, cfg: &UploadConfig) -> Result<NormalizedImage, UploadError> {
    let RawUpload {
        bytes,
        declared_content_type,
        filename,
    } = upload;

    if bytes.len() > cfg.max_upload_bytes {
        return Err(UploadError::TooLarge {
            size: bytes.len(),
            limit: cfg.max_upload_bytes,
        });
    }

    let format = sniff::detect_format(
        &bytes,
        declared_content_type.as_deref(),
        filename.as_deref(),
    )
    .ok_or(UploadError::UnknownType)?;

    if !sniff::is_allowed(format) {
        return Err(UploadError::UnsupportedType(
            format.to_mime_type().to_string(),
        ));
    }

    // Full decode doubles as the integrity check: truncated or internally
    // inconsistent files fail here and never reach classification.
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|err| UploadError::CorruptImage(err.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width <= cfg.max_dimension && height <= cfg.max_dimension {
        return Ok(NormalizedImage {
            bytes,
            width,
            height,
            mime_type: format.to_mime_type().to_string(),
        });
    }

    let resized = decoded.resize(cfg.max_dimension, cfg.max_dimension, FilterType::Lanczos3);
    let encoded = encode(&resized, format, cfg.jpeg_quality)?;

    Ok(NormalizedImage {
        width: resized.width(),
        height: resized.height(),
        bytes: encoded,
        mime_type: format.to_mime_type().to_string(),
    })
}

fn encode(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, UploadError> {
    let mut buf = Cursor::new(Vec::new());
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(|err| UploadError::Encode(err.to_string()))?;
        }
        other => {
            image
                .write_to(&mut buf, other)
                .map_err(|err| UploadError::Encode(err.to_string()))?;
        }
    }
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn synth_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 251) as u8, (y % 241) as u8, ((x + y) % 239) as u8])
        }))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        synth_image(width, height)
            .write_to(&mut buf, ImageFormat::Png)
            .expect("png encode");
        buf.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        synth_image(width, height)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .expect("jpeg encode");
        buf.into_inner()
    }

    #[test]
    fn oversized_jpeg_downscaled_to_longer_edge() {
        let upload = RawUpload::from_bytes(jpeg_bytes(2048, 1024));
        let image = validate(upload, &UploadConfig::default()).expect("valid jpeg");

        assert_eq!(image.width, 1024);
        assert_eq!(image.height, 512);
        assert_eq!(image.mime_type, "image/jpeg");
    }

    #[test]
    fn aspect_ratio_preserved_within_rounding() {
        let upload = RawUpload::from_bytes(png_bytes(3000, 2000));
        let image = validate(upload, &UploadConfig::default()).expect("valid png");

        assert_eq!(image.width, 1024);
        // 2000 * 1024 / 3000 = 682.67; allow one pixel of rounding.
        assert!((682..=684).contains(&image.height), "height {}", image.height);
        assert_eq!(image.mime_type, "image/png");
    }

    #[test]
    fn portrait_images_scale_on_height() {
        let upload = RawUpload::from_bytes(png_bytes(600, 2000));
        let image = validate(upload, &UploadConfig::default()).expect("valid png");

        assert_eq!(image.height, 1024);
        assert!((306..=308).contains(&image.width), "width {}", image.width);
    }

    #[test]
    fn within_bounds_image_passes_through_byte_identical() {
        let bytes = png_bytes(64, 48);
        let upload = RawUpload::from_bytes(bytes.clone());
        let image = validate(upload, &UploadConfig::default()).expect("valid png");

        assert_eq!(image.bytes, bytes);
        assert_eq!((image.width, image.height), (64, 48));
    }

    #[test]
    fn size_limit_rejected_before_anything_else() {
        let cfg = UploadConfig::default().with_max_upload_bytes(16);
        let upload = RawUpload::from_bytes(vec![0u8; 17]);

        let err = validate(upload, &cfg).expect_err("should reject");
        assert_eq!(err, UploadError::TooLarge { size: 17, limit: 16 });
    }

    #[test]
    fn truncated_png_rejected_as_corrupt() {
        let mut bytes = png_bytes(128, 128);
        bytes.truncate(40); // magic intact, body gone

        let err = validate(RawUpload::from_bytes(bytes), &UploadConfig::default())
            .expect_err("should reject");
        assert!(matches!(err, UploadError::CorruptImage(_)));
    }

    #[test]
    fn undetectable_bytes_rejected_as_unknown_type() {
        let upload = RawUpload::from_bytes(b"definitely not an image".to_vec());
        let err = validate(upload, &UploadConfig::default()).expect_err("should reject");
        assert_eq!(err, UploadError::UnknownType);
    }

    #[test]
    fn detectable_but_disallowed_format_rejected() {
        // Minimal ICO header: sniffs as ICO, which is off the allow-list.
        let mut bytes = vec![0x00, 0x00, 0x01, 0x00, 0x01, 0x00];
        bytes.extend_from_slice(&[0u8; 32]);

        let err = validate(RawUpload::from_bytes(bytes), &UploadConfig::default())
            .expect_err("should reject");
        assert!(matches!(err, UploadError::UnsupportedType(_)));
    }

    #[test]
    fn declared_type_fallback_still_hits_integrity_check() {
        let upload = RawUpload {
            bytes: b"no magic at all".to_vec(),
            declared_content_type: Some("image/png".to_string()),
            filename: None,
        };

        let err = validate(upload, &UploadConfig::default()).expect_err("should reject");
        assert!(matches!(err, UploadError::CorruptImage(_)));
    }

    #[test]
    fn custom_max_dimension_respected() {
        let cfg = UploadConfig::default().with_max_dimension(100);
        let upload = RawUpload::from_bytes(png_bytes(400, 200));
        let image = validate(upload, &cfg).expect("valid png");

        assert_eq!(image.width, 100);
        assert_eq!(image.height, 50);
    }
}
