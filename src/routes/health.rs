use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::routes::predict::AppState;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" once the artifacts are loaded)
    pub status: String,
    /// API version
    pub version: String,
    /// Number of crop classes the loaded classifier distinguishes
    pub model_classes: usize,
    /// Active crop selection mode ("top1", "top3", ...)
    pub prediction_mode: String,
}

/// Health check endpoint.
///
/// Returns the API status and version plus the loaded model shape. The
/// artifacts are loaded (and validated) at startup, so a serving process is
/// always "ok" — the metadata is what operators actually check here.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model_classes: state.engine.num_classes(),
        prediction_mode: state.engine.mode().to_string(),
    })
}
