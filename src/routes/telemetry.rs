//! Telemetry HTTP endpoint.
//!
//! - GET /api/v1/telemetry/reading?channel_id=..&api_key=..

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::errors::AppError;
use crate::routes::predict::AppState;
use crate::services::inference::Reading;

#[derive(Debug, Deserialize, IntoParams)]
pub struct TelemetryQuery {
    /// ThingSpeak channel ID
    pub channel_id: String,
    /// Channel read API key
    pub api_key: String,
}

/// Fetch the latest reading from a ThingSpeak channel.
///
/// Returns the four readings mapped from the channel's field slots. The
/// reading is handed back to the caller — feeding it into `/predict` is the
/// caller's next step, there is no server-side session.
#[utoipa::path(
    get,
    path = "/api/v1/telemetry/reading",
    tag = "Telemetry",
    params(TelemetryQuery),
    responses(
        (status = 200, description = "Latest channel reading", body = Reading),
        (status = 400, description = "Empty channel_id", body = crate::errors::ErrorResponse),
        (status = 502, description = "ThingSpeak unreachable or feed unusable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_telemetry_reading(
    State(state): State<AppState>,
    Query(params): Query<TelemetryQuery>,
) -> Result<Json<Reading>, AppError> {
    let channel_id = params.channel_id.trim();
    if channel_id.is_empty() {
        return Err(AppError::BadRequest(
            "channel_id must not be empty".to_string(),
        ));
    }

    let reading = state
        .thingspeak
        .fetch_latest_reading(channel_id, &params.api_key)
        .await?;

    Ok(Json(reading))
}
