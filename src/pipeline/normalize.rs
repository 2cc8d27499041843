//! Image normalization: uploaded photo → size-bounded JPEG data URI.
//!
//! Phone photos of a bill are routinely 4000 px and several megabytes. The
//! model reads a 1600 px rendition just as well, so the longest edge is capped
//! (never upscaled) and the result is re-encoded as JPEG. Aspect ratio is
//! preserved so table columns and chart bars keep their proportions.
//!
//! Phones usually store portrait shots sideways with an EXIF orientation tag.
//! The re-encoded JPEG carries no EXIF, so the orientation is applied to the
//! pixels before resizing.
//!
//! Normalization never fails an upload. If the file cannot be decoded or the
//! JPEG encoder refuses it, the original bytes are forwarded unchanged and the
//! provider gets a chance to read them as they are.

use crate::config::NormalizeOptions;
use crate::error::BillError;
use crate::pipeline::data_uri::ImagePayload;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, warn};

/// MIME type used when the original bytes are not a recognised image.
const UNKNOWN_MIME_TYPE: &str = "application/octet-stream";

/// The transport-ready result of normalizing one upload.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub payload: ImagePayload,
    /// Decoded size of the upload, when it could be decoded.
    pub original_dimensions: Option<(u32, u32)>,
    /// Size of the encoded payload; `None` for passthrough.
    pub dimensions: Option<(u32, u32)>,
    pub original_len: usize,
    /// False when the original bytes were forwarded unchanged.
    pub reencoded: bool,
}

impl NormalizedImage {
    /// `data:<mime>;base64,<payload>`.
    pub fn data_uri(&self) -> String {
        self.payload.to_data_uri()
    }
}

/// Dimensions after capping the longest edge at `max_dimension`.
///
/// Images already within the bound are returned unchanged.
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_dimension && height <= max_dimension) {
        return (width, height);
    }
    let ratio = f64::min(
        max_dimension as f64 / width as f64,
        max_dimension as f64 / height as f64,
    );
    let scale = |v: u32| ((v as f64 * ratio).round() as u32).max(1);
    (scale(width), scale(height))
}

/// Normalize an in-memory upload.
///
/// CPU-bound; call from `spawn_blocking` on an async runtime (as
/// [`normalize_file`] does).
pub fn normalize_bytes(bytes: &[u8], options: &NormalizeOptions) -> NormalizedImage {
    match reencode(bytes, options) {
        Ok(normalized) => normalized,
        Err(e) => {
            warn!("Image normalization failed, forwarding original: {}", e);
            passthrough(bytes)
        }
    }
}

/// Read an image from disk and normalize it.
pub async fn normalize_file(
    path: &Path,
    options: &NormalizeOptions,
) -> Result<NormalizedImage, BillError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BillError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => BillError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => BillError::Internal(format!("reading {}: {e}", path.display())),
    })?;

    let options = *options;
    tokio::task::spawn_blocking(move || normalize_bytes(&bytes, &options))
        .await
        .map_err(|e| BillError::Internal(format!("Normalize task panicked: {}", e)))
}

fn reencode(bytes: &[u8], options: &NormalizeOptions) -> Result<NormalizedImage, image::ImageError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation().unwrap_or_else(|e| {
        debug!("Unreadable orientation metadata, assuming upright: {}", e);
        Orientation::NoTransforms
    });
    let mut img = DynamicImage::from_decoder(decoder)?;
    if orientation != Orientation::NoTransforms {
        debug!("Applying EXIF orientation {:?}", orientation);
        img.apply_orientation(orientation);
    }

    let (width, height) = (img.width(), img.height());
    let (tw, th) = target_dimensions(width, height, options.max_dimension);

    let img = if (tw, th) != (width, height) {
        debug!("Downscaling {}x{} → {}x{}", width, height, tw, th);
        img.resize_exact(tw, th, FilterType::Triangle)
    } else {
        img
    };

    // JPEG has no alpha channel.
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, options.jpeg_quality);
    encoder.encode_image(&rgb)?;

    debug!(
        "Encoded {}x{} JPEG: {} → {} bytes",
        tw,
        th,
        bytes.len(),
        buf.len()
    );

    Ok(NormalizedImage {
        payload: ImagePayload::from_bytes(&buf, "image/jpeg"),
        original_dimensions: Some((width, height)),
        dimensions: Some((tw, th)),
        original_len: bytes.len(),
        reencoded: true,
    })
}

fn passthrough(bytes: &[u8]) -> NormalizedImage {
    let mime_type = image::guess_format(bytes)
        .map(|f| f.to_mime_type())
        .unwrap_or(UNKNOWN_MIME_TYPE);
    NormalizedImage {
        payload: ImagePayload::from_bytes(bytes, mime_type),
        original_dimensions: None,
        dimensions: None,
        original_len: bytes.len(),
        reencoded: false,
    }
}
