//! HTTP wrapper: a small axum service exposing the analysis pipeline.
//!
//! One route does the work: `POST /analyze-image/` accepts a multipart image
//! upload, runs it through the pipeline, and returns the structured record as
//! JSON. Uploads whose content type is not `image/*` are rejected with 400
//! before any bytes reach the pipeline; every unrecovered pipeline failure
//! maps to 500 with a human-readable `detail` string — the service never
//! answers 200 with a malformed body.
//!
//! Uploaded bytes are held in memory only; no temporary file exists to leak
//! on any exit path.

use crate::analyze::analyze_with_transport;
use crate::config::AnalysisConfig;
use crate::error::ScanError;
use crate::pipeline::chat::{ChatTransport, OllamaClient};
use crate::schema::TargetSchema;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Uploads larger than this are rejected outright.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared state for the service: one config, one schema, one transport.
pub struct AppState {
    pub config: AnalysisConfig,
    pub schema: TargetSchema,
    pub transport: Arc<dyn ChatTransport>,
}

impl AppState {
    /// Build state with an [`OllamaClient`] transport from the config.
    pub fn new(config: AnalysisConfig, schema: TargetSchema) -> Result<Self, ScanError> {
        let transport = Arc::new(OllamaClient::from_config(&config)?);
        Ok(Self {
            config,
            schema,
            transport,
        })
    }
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze-image/", post(analyze_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>, addr: &str) -> Result<(), ScanError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ScanError::InvalidConfig(format!("cannot bind '{addr}': {e}")))?;
    info!(
        "listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| addr.to_string())
    );
    axum::serve(listener, router(state))
        .await
        .map_err(|e| ScanError::InvalidConfig(format!("server error: {e}")))
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn analyze_image(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let bytes = match read_image_field(multipart).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };

    match analyze_with_transport(
        state.transport.as_ref(),
        &bytes,
        &state.schema,
        &state.config,
    )
    .await
    {
        Ok(output) => (StatusCode::OK, Json(output.result)).into_response(),
        Err(e) => {
            warn!("analysis failed: {e}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

/// Pull the uploaded image out of the multipart body, enforcing the
/// `image/*` content-type gate before accepting any payload.
async fn read_image_field(mut multipart: Multipart) -> Result<Vec<u8>, Response> {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    "request contains no file field",
                ));
            }
            Err(e) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    &format!("malformed multipart body: {e}"),
                ));
            }
        };

        // Skip non-file fields (e.g. stray form values).
        if field.file_name().is_none() && field.content_type().is_none() {
            continue;
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        if !content_type.starts_with("image/") {
            let e = ScanError::NotAnImage { content_type };
            return Err(error_response(StatusCode::BAD_REQUEST, &e.to_string()));
        }

        return match field.bytes().await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) => Err(error_response(
                StatusCode::BAD_REQUEST,
                &format!("failed to read upload: {e}"),
            )),
        };
    }
}

fn error_response(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({"detail": detail}))).into_response()
}
