//! Configuration for image analysis calls.
//!
//! Every knob lives in one [`AnalysisConfig`] built via its
//! [`AnalysisConfigBuilder`]. Keeping the whole configuration in a single
//! struct makes it cheap to clone per request, serialise for logging, and
//! diff two runs to understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! The config has well over a dozen fields; a positional constructor breaks
//! on every addition. The builder lets callers set only what they care about
//! and rely on documented defaults for the rest.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};

/// Configuration for a single image-analysis pipeline.
///
/// Built via [`AnalysisConfig::builder()`] or [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use scenescan::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .model("llava:7b")
///     .max_edge(800)
///     .jpeg_quality(90)
///     .strict(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Base URL of the Ollama-compatible endpoint. Default: `http://localhost:11434`.
    pub base_url: String,

    /// Model identifier, e.g. "llava:7b" or "llama3.2-vision". Default: "llava:7b".
    pub model: String,

    /// Maximum length of the longer image edge in pixels. Default: 640.
    ///
    /// Vision models with small context windows cannot afford large images —
    /// a 4000 px photo costs the same tokens as a 640 px one carries most of
    /// the same scene information. Images are never upscaled to reach this.
    pub max_edge: u32,

    /// JPEG encoder quality, 1–100. Default: 80.
    pub jpeg_quality: u8,

    /// Convert the image to single-channel grayscale before sending. Default: false.
    ///
    /// Grayscale shrinks the payload further but loses colour cues
    /// (e.g. distinguishing a uniform from casual clothing), so it is off
    /// unless the caller opts in.
    pub grayscale: bool,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Near-zero keeps the model deterministic and faithful to what it sees,
    /// which is what structured extraction needs.
    pub temperature: f32,

    /// Context window size in tokens passed as `num_ctx`. Default: 1024.
    pub num_ctx: u32,

    /// CPU threads for inference, passed as `num_thread`. Default: 8.
    pub num_thread: u32,

    /// GPUs to use, passed as `num_gpu`. Default: 1.
    pub num_gpu: u32,

    /// Top-k sampling cutoff. Default: 40.
    pub top_k: u32,

    /// Nucleus sampling threshold. Default: 0.9.
    pub top_p: f32,

    /// Failure policy for parse/validation errors. Default: false (best-effort).
    ///
    /// `false`: a reply that fails to parse or validate is replaced by the
    /// schema's deterministic fallback record (logged at `warn`).
    /// `true`: the same failures surface as [`ScanError::Parse`] /
    /// [`ScanError::Validation`].
    pub strict: bool,

    /// Send the target schema as Ollama's `format` field. Default: true.
    ///
    /// Models that support structured outputs will then emit schema-shaped
    /// JSON directly. The extractor still tolerates fences and malformed
    /// replies for models that ignore the field.
    pub format_schema: bool,

    /// Per-chat-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Retry attempts on transport/timeout failures. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (doubles per attempt). Default: 500.
    pub retry_backoff_ms: u64,

    /// Custom system prompt. If None, the schema's built-in prompt is used.
    pub system_prompt: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llava:7b".to_string(),
            max_edge: 640,
            jpeg_quality: 80,
            grayscale: false,
            temperature: 0.1,
            num_ctx: 1024,
            num_thread: 8,
            num_gpu: 1,
            top_k: 40,
            top_p: 0.9,
            strict: false,
            format_schema: true,
            api_timeout_secs: 60,
            max_retries: 2,
            retry_backoff_ms: 500,
            system_prompt: None,
        }
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn max_edge(mut self, px: u32) -> Self {
        self.config.max_edge = px.max(1);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn grayscale(mut self, v: bool) -> Self {
        self.config.grayscale = v;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn num_ctx(mut self, n: u32) -> Self {
        self.config.num_ctx = n;
        self
    }

    pub fn num_thread(mut self, n: u32) -> Self {
        self.config.num_thread = n.max(1);
        self
    }

    pub fn num_gpu(mut self, n: u32) -> Self {
        self.config.num_gpu = n;
        self
    }

    pub fn top_k(mut self, k: u32) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.config.top_p = p.clamp(0.0, 1.0);
        self
    }

    pub fn strict(mut self, v: bool) -> Self {
        self.config.strict = v;
        self
    }

    pub fn format_schema(mut self, v: bool) -> Self {
        self.config.format_schema = v;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, ScanError> {
        let c = &self.config;
        if c.max_edge == 0 {
            return Err(ScanError::InvalidConfig("max_edge must be ≥ 1".into()));
        }
        if c.jpeg_quality == 0 || c.jpeg_quality > 100 {
            return Err(ScanError::InvalidConfig(format!(
                "jpeg_quality must be 1–100, got {}",
                c.jpeg_quality
            )));
        }
        if c.base_url.is_empty() {
            return Err(ScanError::InvalidConfig("base_url must not be empty".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let c = AnalysisConfig::default();
        assert_eq!(c.model, "llava:7b");
        assert_eq!(c.max_edge, 640);
        assert_eq!(c.jpeg_quality, 80);
        assert!(!c.grayscale);
        assert!(!c.strict);
        assert_eq!(c.num_ctx, 1024);
    }

    #[test]
    fn builder_clamps_quality() {
        let c = AnalysisConfig::builder().jpeg_quality(250).build().unwrap();
        assert_eq!(c.jpeg_quality, 100);
        let c = AnalysisConfig::builder().jpeg_quality(0).build().unwrap();
        assert_eq!(c.jpeg_quality, 1);
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = AnalysisConfig::builder().temperature(5.0).build().unwrap();
        assert!((c.temperature - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn empty_base_url_rejected() {
        let err = AnalysisConfig::builder().base_url("").build().unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }
}
