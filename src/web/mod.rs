use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::game::AnalysisMode;
use crate::pipeline::{AnalysisRequest, Pipeline, PipelineError, PipelineOutput, StageFailure};
use crate::vision::ImagePayload;

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeRequest {
    #[serde(default)]
    mode: AnalysisMode,
    image_base64: Option<String>,
    media_type: Option<String>,
    image_name: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default = "default_explain")]
    explain: bool,
}

fn default_explain() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage: Option<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    fields: BTreeSet<&'static str>,
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("image_base64 is not valid base64")]
    BadImage,
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, stage, fields) = match &self {
            ApiError::BadImage => (StatusCode::BAD_REQUEST, None, BTreeSet::new()),
            ApiError::Pipeline(err) => {
                let status = if err.is_recoverable() {
                    StatusCode::UNPROCESSABLE_ENTITY
                } else if matches!(err.failure, StageFailure::Timeout(_)) {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, Some(err.stage.to_string()), err.invalid_fields())
            }
        };
        let error = match &self {
            ApiError::Pipeline(err) => err.failure.to_string(),
            other => other.to_string(),
        };
        let body = Json(ErrorResponse {
            error,
            stage,
            fields,
        });
        (status, body).into_response()
    }
}

pub async fn serve(addr: SocketAddr, pipeline: Arc<Pipeline>) -> Result<()> {
    let app = router(pipeline);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    let state = AppState { pipeline };
    let api = Router::new().route("/analyze", post(analyze));

    Router::new()
        .route("/healthz", get(health))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn analyze(
    State(state): State<AppState>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<PipelineOutput>, ApiError> {
    let image = req
        .image_base64
        .as_deref()
        .map(|encoded| decode_image(encoded, req.media_type, req.image_name))
        .transpose()?;

    let mut request = AnalysisRequest::new(req.mode, image, req.fields);
    if !req.explain {
        request = request.unexplained();
    }
    let output = state.pipeline.run(request).await?;
    Ok(Json(output))
}

fn decode_image(
    encoded: &str,
    media_type: Option<String>,
    name: Option<String>,
) -> Result<ImagePayload, ApiError> {
    // Browsers hand over data URLs; keep only the payload.
    let payload = encoded
        .split_once(";base64,")
        .map_or(encoded, |(_, payload)| payload);
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|_| ApiError::BadImage)?;
    let mut image = ImagePayload::new(bytes, media_type.unwrap_or_else(|| "image/png".to_string()));
    if let Some(name) = name {
        image = image.named(name);
    }
    Ok(image)
}
