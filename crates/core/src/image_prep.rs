//! Source-image preprocessing for image-driven and transition requests.
//!
//! Every image goes through the same steps before submission:
//!
//! 1. format and file-size checks,
//! 2. conversion to 3-channel RGB,
//! 3. downscale to fit 1920x1080 (never upscale),
//! 4. optional center crop to the requested aspect ratio,
//! 5. encode, then walk the JPEG quality ladder until under the target
//!    size (the last rung is accepted with a warning),
//! 6. base64.
//!
//! Everything here is synchronous CPU work; async callers should run it on
//! a blocking thread.

use std::io::Cursor;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, RgbImage};

use crate::error::CoreError;
use crate::request::{AspectRatio, EncodedImage};

/// File extensions accepted as source images.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

const MB: u64 = 1024 * 1024;

/// Tunables for [`prepare_image`].
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Source files larger than this are rejected outright.
    pub max_file_bytes: u64,
    /// Encoded size the quality ladder aims for.
    pub target_bytes: u64,
    pub max_width: u32,
    pub max_height: u32,
    /// Relative aspect difference under which no crop is applied.
    pub aspect_tolerance: f64,
    /// Quality for the first encode of a JPEG source.
    pub initial_jpeg_quality: u8,
    /// JPEG qualities tried in order when the first encode is too large.
    pub quality_ladder: Vec<u8>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 50 * MB,
            target_bytes: 5 * MB,
            max_width: 1920,
            max_height: 1080,
            aspect_tolerance: 0.05,
            initial_jpeg_quality: 95,
            quality_ladder: vec![85, 75, 65, 55],
        }
    }
}

/// A preprocessed image ready for the wire.
#[derive(Clone)]
pub struct PreparedImage {
    /// Standard base64 of the encoded bytes.
    pub data: String,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub encoded_bytes: usize,
    /// JPEG quality of the final encode; `None` for PNG.
    pub quality: Option<u8>,
}

impl std::fmt::Debug for PreparedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedImage")
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("encoded_bytes", &self.encoded_bytes)
            .field("quality", &self.quality)
            .finish()
    }
}

impl PreparedImage {
    pub fn into_encoded(self) -> EncodedImage {
        EncodedImage {
            mime_type: self.mime_type.to_string(),
            data: self.data,
        }
    }
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Dimensions after shrinking `(width, height)` to fit inside the bounds
/// while keeping the aspect ratio. Images already inside are unchanged.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_width) / f64::from(width),
        f64::from(max_height) / f64::from(height),
    );
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w.min(max_width), h.min(max_height))
}

/// Centered crop rectangle `(x, y, width, height)` bringing the image to
/// `target_ratio`, or `None` when it is already within `tolerance`.
pub fn center_crop_dims(
    width: u32,
    height: u32,
    target_ratio: f64,
    tolerance: f64,
) -> Option<(u32, u32, u32, u32)> {
    if width == 0 || height == 0 || target_ratio <= 0.0 {
        return None;
    }
    let current = f64::from(width) / f64::from(height);
    if ((current - target_ratio) / target_ratio).abs() <= tolerance {
        return None;
    }
    if current > target_ratio {
        // Too wide: trim the sides.
        let w = ((f64::from(height) * target_ratio).round() as u32).clamp(1, width);
        Some(((width - w) / 2, 0, w, height))
    } else {
        // Too tall: trim top and bottom.
        let h = ((f64::from(width) / target_ratio).round() as u32).clamp(1, height);
        Some((0, (height - h) / 2, width, h))
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Check existence, extension and file size without decoding.
pub fn validate_image_file(path: &Path, config: &PreprocessConfig) -> Result<(), CoreError> {
    if !path.is_file() {
        return Err(CoreError::validation(format!(
            "Image file not found: {}",
            path.display()
        )));
    }

    let supported = extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false);
    if !supported {
        return Err(CoreError::validation(format!(
            "Unsupported image format: {}. Supported formats: {}",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        )));
    }

    let size = std::fs::metadata(path)
        .map_err(|e| CoreError::validation(format!("Cannot read {}: {e}", path.display())))?
        .len();
    if size > config.max_file_bytes {
        return Err(CoreError::validation(format!(
            "Image too large ({:.1}MB). Max {}MB",
            size as f64 / MB as f64,
            config.max_file_bytes / MB
        )));
    }
    Ok(())
}

fn encode_jpeg(img: &RgbImage, quality: u8) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(img)
        .map_err(|e| CoreError::Internal(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(img: &RgbImage) -> Result<Vec<u8>, CoreError> {
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| CoreError::Internal(format!("PNG encode failed: {e}")))?;
    Ok(buf.into_inner())
}

/// Run the full preprocessing pipeline on the image at `path`.
///
/// `target_aspect` requests a center crop when the source ratio differs
/// by more than the configured tolerance.
pub fn prepare_image(
    path: &Path,
    target_aspect: Option<AspectRatio>,
    config: &PreprocessConfig,
) -> Result<PreparedImage, CoreError> {
    validate_image_file(path, config)?;

    let decoded: DynamicImage = ImageReader::open(path)
        .map_err(|e| CoreError::validation(format!("Cannot open {}: {e}", path.display())))?
        .with_guessed_format()
        .map_err(|e| CoreError::validation(format!("Cannot read {}: {e}", path.display())))?
        .decode()
        .map_err(|e| {
            CoreError::validation(format!("Could not decode image {}: {e}", path.display()))
        })?;

    let mut rgb = decoded.to_rgb8();

    let (w, h) = rgb.dimensions();
    let (fw, fh) = fit_within(w, h, config.max_width, config.max_height);
    if (fw, fh) != (w, h) {
        tracing::debug!(from = ?(w, h), to = ?(fw, fh), "Downscaling source image");
        rgb = image::imageops::resize(&rgb, fw, fh, FilterType::Lanczos3);
    }

    if let Some(aspect) = target_aspect {
        let (w, h) = rgb.dimensions();
        if let Some((x, y, cw, ch)) =
            center_crop_dims(w, h, aspect.ratio(), config.aspect_tolerance)
        {
            tracing::debug!(aspect = %aspect, crop = ?(cw, ch), "Cropping source image");
            rgb = image::imageops::crop_imm(&rgb, x, y, cw, ch).to_image();
        }
    }

    let source_is_jpeg = matches!(extension_of(path).as_deref(), Some("jpg" | "jpeg"));
    let (mut bytes, mut mime_type, mut quality) = if source_is_jpeg {
        (
            encode_jpeg(&rgb, config.initial_jpeg_quality)?,
            "image/jpeg",
            Some(config.initial_jpeg_quality),
        )
    } else {
        (encode_png(&rgb)?, "image/png", None)
    };

    if bytes.len() as u64 > config.target_bytes {
        for &q in &config.quality_ladder {
            bytes = encode_jpeg(&rgb, q)?;
            mime_type = "image/jpeg";
            quality = Some(q);
            if bytes.len() as u64 <= config.target_bytes {
                break;
            }
        }
        if bytes.len() as u64 > config.target_bytes {
            tracing::warn!(
                path = %path.display(),
                encoded_bytes = bytes.len(),
                target_bytes = config.target_bytes,
                "Image still above target size after compression"
            );
        }
    }

    let (width, height) = rgb.dimensions();
    Ok(PreparedImage {
        data: STANDARD.encode(&bytes),
        mime_type,
        width,
        height,
        encoded_bytes: bytes.len(),
        quality,
    })
}
