//! Prediction HTTP endpoint.
//!
//! - POST /api/v1/predict

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::helpers::dec_to_f64;
use crate::services::inference::{InferenceEngine, RawReading};
use crate::services::thingspeak::ThingSpeakClient;

/// Shared application state.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) engine: Arc<InferenceEngine>,
    pub(crate) thingspeak: ThingSpeakClient,
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct PredictRequest {
    /// Air temperature in °C
    pub temperature: Option<f64>,
    /// Relative humidity in %
    pub humidity: Option<f64>,
    /// Soil pH
    pub ph: Option<f64>,
    /// Rainfall in mm
    pub rainfall: Option<f64>,
    /// Include the cotton suitability detail (default true)
    #[serde(default = "default_cotton_details")]
    pub cotton_details: bool,
}

fn default_cotton_details() -> bool {
    true
}

/// Cotton suitability detail: the model signal, the rule signal, and the
/// combined advice.
#[derive(Debug, Serialize, ToSchema)]
pub struct CottonSuitability {
    /// Model probability for the cotton class, in percent (2 decimals)
    pub probability_pct: f64,
    /// Whether the fixed-threshold range rule holds for the raw readings
    pub ideal: bool,
    /// "ideal", "suggested_not_ideal" or "better_suited"
    pub status: String,
    /// Human-readable advice
    pub message: String,
}

/// Prediction response.
#[derive(Debug, Serialize, ToSchema)]
pub struct PredictionResponse {
    /// Recommended crop name, or "Unknown" for labels outside the table
    pub crop: String,
    /// Classifier label of the selected crop
    pub label: u32,
    /// Cotton suitability detail; omitted when not requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cotton: Option<CottonSuitability>,
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Predict a suitable crop from four environmental readings.
///
/// All four readings are required; a request with any missing field is
/// refused before the classifier runs. With `cotton_details` (default true)
/// the response also carries the cotton probability and the range-rule
/// verdict folded into advice.
#[utoipa::path(
    post,
    path = "/api/v1/predict",
    tag = "Prediction",
    request_body = PredictRequest,
    responses(
        (status = 200, description = "Prediction result", body = PredictionResponse),
        (status = 400, description = "Non-finite reading value", body = crate::errors::ErrorResponse),
        (status = 422, description = "Missing reading field(s)", body = crate::errors::ErrorResponse),
    )
)]
pub async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictionResponse>, AppError> {
    let raw = RawReading {
        temperature: req.temperature,
        humidity: req.humidity,
        ph: req.ph,
        rainfall: req.rainfall,
    };

    let prediction = state.engine.predict(&raw, req.cotton_details)?;

    Ok(Json(PredictionResponse {
        crop: prediction.crop.to_string(),
        label: prediction.label,
        cotton: prediction.cotton.map(|c| CottonSuitability {
            probability_pct: dec_to_f64(c.probability_pct),
            ideal: c.ideal,
            status: c.advice.status().to_string(),
            message: c.advice.message(),
        }),
    }))
}
