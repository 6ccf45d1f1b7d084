//! Error types for the scenescan library.
//!
//! One enum covers the whole pipeline, but its variants fall into two groups
//! with different propagation rules:
//!
//! * **Always surfaced** — [`ScanError::Decode`], [`ScanError::Transport`]
//!   and [`ScanError::Timeout`] cannot be recovered locally: if the image
//!   does not decode or the model endpoint is down there is nothing useful
//!   to return.
//!
//! * **Policy-dependent** — [`ScanError::Parse`] and [`ScanError::Validation`]
//!   describe a model reply that did not match the target schema. In strict
//!   mode they surface as errors; in best-effort mode the extractor logs them
//!   and substitutes the schema's deterministic fallback record instead
//!   (see [`crate::pipeline::extract`]). They are never silently dropped.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the scenescan library.
#[derive(Debug, Error)]
pub enum ScanError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Image file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The bytes could not be decoded as an image in any supported format.
    #[error("Failed to decode image: {detail}\nSupported formats: PNG, JPEG, GIF, WebP, BMP.")]
    Decode { detail: String },

    /// The normalized image could not be re-encoded as JPEG.
    #[error("Failed to encode image as JPEG: {detail}")]
    Encode { detail: String },

    /// An upload declared a content type that is not an image.
    #[error("File is not an image: content type '{content_type}'")]
    NotAnImage { content_type: String },

    // ── Remote model errors ───────────────────────────────────────────────
    /// The chat endpoint returned a non-success status or the request failed
    /// outright (connection refused, DNS, malformed response body).
    #[error("Chat endpoint error{}: {detail}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        detail: String,
    },

    /// The chat call exceeded the configured deadline.
    #[error("Chat call timed out after {secs}s\nIncrease api_timeout_secs or check that the model is loaded.")]
    Timeout { secs: u64 },

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The model reply was not valid JSON after fence stripping.
    #[error("Model reply is not valid JSON: {detail}\nReply started with: {snippet:?}")]
    Parse { detail: String, snippet: String },

    /// The parsed reply violates the target schema.
    #[error("Reply does not match schema: field '{field}': {detail}")]
    Validation { field: String, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not read or write a file (normalized image, report).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ScanError {
    /// True for failures the best-effort policy may downgrade to a fallback
    /// record: the reply arrived but did not fit the schema.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::Parse { .. } | ScanError::Validation { .. })
    }
}
