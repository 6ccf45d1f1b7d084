//! End-to-end analysis entry points.
//!
//! One call is one pipeline run: normalise the image, build the chat request,
//! one network round trip (with transient-failure retries), extract the
//! structured record. There is no shared state between calls — callers may
//! run any number of analyses in parallel, each with its own ephemeral
//! normalized image buffer.
//!
//! [`analyze`] and [`analyze_bytes`] construct an [`OllamaClient`] from the
//! config; [`analyze_with_transport`] takes any [`ChatTransport`] and is the
//! seam the HTTP server and the tests use.

use crate::config::AnalysisConfig;
use crate::error::ScanError;
use crate::pipeline::chat::{
    chat_with_retry, ChatMessage, ChatRequest, ChatTransport, GenerationOptions, OllamaClient,
};
use crate::pipeline::extract::extract;
use crate::pipeline::optimize::{optimize_image, OptimizeOptions};
use crate::prompts;
use crate::schema::{StructuredResult, TargetSchema};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// The outcome of one analysis call.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutput {
    /// The validated (or fallback) record.
    pub result: StructuredResult,
    /// The model's raw reply text, before fence stripping.
    pub raw_reply: String,
    /// Model identifier that produced the reply.
    pub model: String,
    /// Wall-clock duration of the whole call in milliseconds.
    pub duration_ms: u64,
    /// Transport retries that were needed.
    pub retries: u32,
    /// Dimensions of the normalized image that was sent, if any.
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

/// Analyze an image file against a target schema.
pub async fn analyze(
    path: impl AsRef<Path>,
    schema: &TargetSchema,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ScanError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ScanError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => ScanError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    analyze_bytes(&bytes, schema, config).await
}

/// Analyze in-memory image bytes against a target schema.
pub async fn analyze_bytes(
    bytes: &[u8],
    schema: &TargetSchema,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ScanError> {
    let client = OllamaClient::from_config(config)?;
    analyze_with_transport(&client, bytes, schema, config).await
}

/// Analyze image bytes using a caller-supplied transport.
pub async fn analyze_with_transport(
    transport: &dyn ChatTransport,
    bytes: &[u8],
    schema: &TargetSchema,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ScanError> {
    let start = Instant::now();

    let normalized = optimize_image(bytes, &OptimizeOptions::from_config(config))?;
    debug!(
        "Normalized image: {}x{}, {} bytes",
        normalized.width,
        normalized.height,
        normalized.bytes.len()
    );

    let (system, user) = prompts_for(schema, config);
    let messages = vec![
        ChatMessage::system(system),
        ChatMessage::user_with_images(user, vec![normalized.to_base64()]),
    ];

    let output = run_chat(
        transport,
        messages,
        schema,
        config,
        start,
        Some((normalized.width, normalized.height)),
    )
    .await?;
    info!(
        schema = %schema.name,
        model = %output.model,
        duration_ms = output.duration_ms,
        retries = output.retries,
        "analysis complete"
    );
    Ok(output)
}

/// Analyze a text passage (no image) against a target schema, e.g.
/// named-entity extraction. `user_prompt` carries the full instruction,
/// typically built with [`prompts::entity_extraction_prompt`].
pub async fn analyze_text(
    user_prompt: &str,
    schema: &TargetSchema,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ScanError> {
    let client = OllamaClient::from_config(config)?;
    analyze_text_with_transport(&client, user_prompt, schema, config).await
}

/// Text-only analysis using a caller-supplied transport.
pub async fn analyze_text_with_transport(
    transport: &dyn ChatTransport,
    user_prompt: &str,
    schema: &TargetSchema,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, ScanError> {
    let start = Instant::now();
    let messages = vec![ChatMessage::user(user_prompt)];
    run_chat(transport, messages, schema, config, start, None).await
}

async fn run_chat(
    transport: &dyn ChatTransport,
    messages: Vec<ChatMessage>,
    schema: &TargetSchema,
    config: &AnalysisConfig,
    start: Instant,
    dimensions: Option<(u32, u32)>,
) -> Result<AnalysisOutput, ScanError> {
    let request = ChatRequest {
        model: config.model.clone(),
        messages,
        stream: false,
        format: config.format_schema.then(|| schema.json_schema()),
        options: GenerationOptions::from_config(config),
    };

    let (raw_reply, retries) =
        chat_with_retry(transport, &request, config.max_retries, config.retry_backoff_ms).await?;

    let result = extract(&raw_reply, schema, config.strict)?;

    Ok(AnalysisOutput {
        result,
        raw_reply,
        model: config.model.clone(),
        duration_ms: start.elapsed().as_millis() as u64,
        retries,
        image_width: dimensions.map(|(w, _)| w),
        image_height: dimensions.map(|(_, h)| h),
    })
}

/// Pick the system/user prompt pair for a schema, honouring the config's
/// system-prompt override.
fn prompts_for(schema: &TargetSchema, config: &AnalysisConfig) -> (String, String) {
    let (default_system, user) = match schema.name.as_str() {
        "security_assessment" => (
            prompts::SECURITY_SYSTEM_PROMPT,
            prompts::SECURITY_USER_PROMPT.to_string(),
        ),
        "album_details" => (
            prompts::DESCRIPTION_SYSTEM_PROMPT,
            prompts::ALBUM_USER_PROMPT.to_string(),
        ),
        _ => (
            prompts::DESCRIPTION_SYSTEM_PROMPT,
            "Analyze this image and respond ONLY with a JSON object matching the requested schema."
                .to_string(),
        ),
    };
    let system = config
        .system_prompt
        .clone()
        .unwrap_or_else(|| default_system.to_string());
    (system, user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::security_assessment;

    #[test]
    fn prompt_override_wins() {
        let config = AnalysisConfig::builder()
            .system_prompt("you are a test")
            .build()
            .unwrap();
        let (system, _) = prompts_for(&security_assessment(), &config);
        assert_eq!(system, "you are a test");
    }

    #[test]
    fn security_schema_gets_security_prompts() {
        let config = AnalysisConfig::default();
        let (system, user) = prompts_for(&security_assessment(), &config);
        assert!(system.contains("security"));
        assert!(user.contains("has_weapon"));
    }

    #[tokio::test]
    async fn missing_file_maps_to_file_not_found() {
        let err = analyze(
            "/does/not/exist.jpg",
            &security_assessment(),
            &AnalysisConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ScanError::FileNotFound { .. }));
    }
}
