//! Image preprocessing: decode, normalise colour mode, downscale, re-encode.
//!
//! Vision models with small context windows cannot afford full-resolution
//! photos, so every source image is normalised before transmission: decoded
//! from whatever format it arrived in, converted to a JPEG-safe colour mode,
//! downscaled so its longer edge fits the configured bound (never upscaled),
//! and re-encoded as JPEG at a configured quality.
//!
//! ## Colour rule
//!
//! One rule for every call site: when `grayscale` is set the image becomes
//! single-channel Luma8; otherwise it is forced to RGB8. Palette, RGBA and
//! 16-bit modes are always converted, so JPEG encoding cannot fail on an
//! unsupported colour type.

use crate::error::ScanError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Knobs for [`optimize_image`]. Usually borrowed from
/// [`crate::config::AnalysisConfig`] via [`OptimizeOptions::from_config`].
#[derive(Debug, Clone, Copy)]
pub struct OptimizeOptions {
    /// Maximum length of the longer edge; the image is never upscaled.
    pub max_edge: u32,
    /// JPEG quality, 1–100.
    pub quality: u8,
    /// Convert to single-channel grayscale.
    pub grayscale: bool,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_edge: 640,
            quality: 80,
            grayscale: false,
        }
    }
}

impl OptimizeOptions {
    pub fn from_config(config: &crate::config::AnalysisConfig) -> Self {
        Self {
            max_edge: config.max_edge,
            quality: config.jpeg_quality,
            grayscale: config.grayscale,
        }
    }
}

/// A normalised, bounded-size JPEG ready for transmission.
///
/// Owned by the call that created it; nothing is written to disk unless the
/// caller explicitly invokes [`NormalizedImage::persist`].
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    /// JPEG-encoded bytes.
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub grayscale: bool,
}

impl NormalizedImage {
    /// Encode the JPEG bytes as standard base64, the form the chat API's
    /// `images` list expects.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Write the normalised image under `dir` as `opt-{token}-{stem}.jpg`.
    ///
    /// `token` must be unique per request (see [`request_token`]) so
    /// concurrent requests for the same source file never collide. The
    /// returned path is the one and only value callers should use for later
    /// cleanup — do not re-derive it.
    pub fn persist(
        &self,
        dir: &Path,
        source_name: &str,
        token: &str,
    ) -> Result<PathBuf, ScanError> {
        std::fs::create_dir_all(dir).map_err(|e| ScanError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let stem = Path::new(source_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");
        let path = dir.join(format!("opt-{token}-{stem}.jpg"));
        std::fs::write(&path, &self.bytes).map_err(|e| ScanError::Io {
            path: path.clone(),
            source: e,
        })?;
        debug!("Persisted normalized image: {}", path.display());
        Ok(path)
    }
}

/// Generate a unique per-request token for temporary artifact names.
pub fn request_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Normalise raw image bytes into a bounded-size JPEG.
///
/// Guarantees on success:
/// * the longer edge is ≤ `opts.max_edge` and ≤ the source's longer edge;
/// * the output is JPEG regardless of the source format;
/// * the source bytes are untouched.
pub fn optimize_image(bytes: &[u8], opts: &OptimizeOptions) -> Result<NormalizedImage, ScanError> {
    let img = image::load_from_memory(bytes).map_err(|e| ScanError::Decode {
        detail: e.to_string(),
    })?;
    let (src_w, src_h) = (img.width(), img.height());

    let img = if opts.grayscale {
        DynamicImage::ImageLuma8(img.to_luma8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };

    // Downscale only; `resize` preserves aspect ratio within the bounding box.
    let img = if img.width().max(img.height()) > opts.max_edge {
        img.resize(opts.max_edge, opts.max_edge, FilterType::Lanczos3)
    } else {
        img
    };

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), opts.quality);
    img.write_with_encoder(encoder)
        .map_err(|e| ScanError::Encode {
            detail: e.to_string(),
        })?;

    debug!(
        "Optimized image {}x{} → {}x{} ({} bytes, q={}, grayscale={})",
        src_w,
        src_h,
        img.width(),
        img.height(),
        buf.len(),
        opts.quality,
        opts.grayscale
    );

    Ok(NormalizedImage {
        bytes: buf,
        width: img.width(),
        height: img.height(),
        grayscale: opts.grayscale,
    })
}

/// Read and normalise an image file.
pub fn optimize_file(
    path: impl AsRef<Path>,
    opts: &OptimizeOptions,
) -> Result<NormalizedImage, ScanError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ScanError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ScanError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    optimize_image(&bytes, opts)
}
