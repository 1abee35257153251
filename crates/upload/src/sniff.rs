//! Content-type detection for uploaded bytes.
//!
//! Magic-number sniffing over the byte content is authoritative; the
//! declared content type and the filename extension are consulted only when
//! sniffing finds nothing. A client lying about `Content-Type` therefore
//! cannot smuggle a non-image past the allow-list.

use std::path::Path;

use image::ImageFormat;

/// Raster formats accepted for report photos.
const ALLOWED_FORMATS: [ImageFormat; 6] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
];

/// Detect the image format of an upload.
///
/// Probe order: byte content, declared MIME type, filename extension.
/// Returns `None` when every probe comes up empty.
pub(crate) fn detect_format(
    bytes: &[u8],
    declared_content_type: Option<&str>,
    filename: Option<&str>,
) -> Option<ImageFormat> {
    if let Ok(format) = image::guess_format(bytes) {
        return Some(format);
    }

    if let Some(format) = declared_content_type.and_then(ImageFormat::from_mime_type) {
        return Some(format);
    }

    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ImageFormat::from_extension(ext))
}

pub(crate) fn is_allowed(format: ImageFormat) -> bool {
    ALLOWED_FORMATS.contains(&format)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
    const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff\xe0";

    #[test]
    fn content_sniffing_wins_over_declared_type() {
        // PNG bytes declared as JPEG still sniff as PNG.
        let format = detect_format(PNG_MAGIC, Some("image/jpeg"), Some("photo.jpg"));
        assert_eq!(format, Some(ImageFormat::Png));
    }

    #[test]
    fn declared_type_used_when_sniffing_fails() {
        let format = detect_format(b"no magic here", Some("image/png"), None);
        assert_eq!(format, Some(ImageFormat::Png));
    }

    #[test]
    fn extension_is_the_last_resort() {
        let format = detect_format(b"no magic here", None, Some("upload.jpeg"));
        assert_eq!(format, Some(ImageFormat::Jpeg));
    }

    #[test]
    fn nothing_detected_yields_none() {
        assert_eq!(detect_format(b"plain text", None, None), None);
        assert_eq!(detect_format(b"", None, Some("notes.txt")), None);
    }

    #[test]
    fn allow_list_covers_raster_formats_only() {
        assert!(is_allowed(ImageFormat::Jpeg));
        assert!(is_allowed(ImageFormat::Png));
        assert!(is_allowed(ImageFormat::Gif));
        assert!(is_allowed(ImageFormat::WebP));
        assert!(is_allowed(ImageFormat::Bmp));
        assert!(is_allowed(ImageFormat::Tiff));
        assert!(!is_allowed(ImageFormat::Ico));
        assert!(!is_allowed(ImageFormat::Avif));
    }

    #[test]
    fn jpeg_magic_detected() {
        assert_eq!(
            detect_format(JPEG_MAGIC, None, None),
            Some(ImageFormat::Jpeg)
        );
    }
}
