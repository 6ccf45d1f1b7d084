//! # scenescan
//!
//! Structured image analysis with locally hosted vision language models.
//!
//! ## Why this crate?
//!
//! A local VLM (served by Ollama) can describe an image, but its reply is
//! free-form text: sometimes clean JSON, sometimes JSON wrapped in markdown
//! fences, sometimes truncated or off-schema. This crate owns the two pieces
//! that make such a model usable as a component:
//!
//! * **Image preprocessing** — any decodable image is normalised into a
//!   bounded-size JPEG (longer edge capped, aspect preserved, colour mode
//!   made JPEG-safe) so it fits a small model context window.
//! * **Structured extraction** — the reply is fence-stripped, parsed, and
//!   validated against a declarative [`TargetSchema`]; failures either
//!   surface as typed errors (strict mode) or become a deterministic
//!   fallback record (best-effort mode), never a silent partial result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image
//!  │
//!  ├─ 1. Optimize  decode, colour-normalise, downscale, JPEG re-encode
//!  ├─ 2. Chat      base64 image + prompt → Ollama /api/chat
//!  ├─ 3. Extract   fence strip → JSON parse → schema validation
//!  └─ 4. Output    typed StructuredResult (+ optional markdown report)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scenescan::{analyze, schema, AnalysisConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalysisConfig::default(); // llava:7b on localhost:11434
//!     let output = analyze("camera-frame.jpg", &schema::security_assessment(), &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&output.result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | Enables the `scenescan` binary (clap + anyhow + tracing-subscriber) |
//! | `server` | on      | Enables the axum HTTP service (`POST /analyze-image/`) |
//!
//! Disable both when using only the library:
//! ```toml
//! scenescan = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod schema;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{
    analyze, analyze_bytes, analyze_text, analyze_text_with_transport, analyze_with_transport,
    AnalysisOutput,
};
pub use config::{AnalysisConfig, AnalysisConfigBuilder};
pub use error::ScanError;
pub use pipeline::chat::{ChatMessage, ChatRequest, ChatTransport, GenerationOptions, OllamaClient};
pub use pipeline::extract::extract;
pub use pipeline::optimize::{
    optimize_file, optimize_image, request_token, NormalizedImage, OptimizeOptions,
};
pub use schema::{FieldKind, FieldSpec, FieldValue, StructuredResult, TargetSchema};
