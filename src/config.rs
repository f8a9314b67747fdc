use crate::services::inference::PredictionMode;
use crate::services::thingspeak::{FieldMapping, THINGSPEAK_BASE_URL};

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Directory containing the trained artifacts (crop_model.json, scaler.json).
    pub model_dir: String,
    /// Crop selection mode: deterministic top-1 or randomized top-k.
    pub prediction_mode: PredictionMode,
    /// ThingSpeak API base URL (overridable for testing).
    pub thingspeak_base_url: String,
    /// Which feed slot holds which reading.
    pub field_mapping: FieldMapping,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            model_dir: std::env::var("MODEL_DIR").unwrap_or_else(|_| "./data".to_string()),
            prediction_mode: std::env::var("PREDICTION_MODE")
                .unwrap_or_else(|_| "top1".to_string())
                .parse()
                .expect("PREDICTION_MODE must be 'top1' or 'top<k>' (e.g. top3, top5)"),
            thingspeak_base_url: std::env::var("THINGSPEAK_BASE_URL")
                .unwrap_or_else(|_| THINGSPEAK_BASE_URL.to_string()),
            field_mapping: FieldMapping {
                temperature: field_slot("THINGSPEAK_FIELD_TEMPERATURE", 1),
                humidity: field_slot("THINGSPEAK_FIELD_HUMIDITY", 2),
                ph: field_slot("THINGSPEAK_FIELD_PH", 5),
                rainfall: field_slot("THINGSPEAK_FIELD_RAINFALL", 4),
            },
        }
    }
}

/// Parse a feed slot number (1..=8) from an env var, with a default.
fn field_slot(var: &str, default: u8) -> u8 {
    let slot = std::env::var(var)
        .map(|v| {
            v.parse::<u8>()
                .unwrap_or_else(|_| panic!("{} must be a number between 1 and 8", var))
        })
        .unwrap_or(default);
    assert!(
        (1..=8).contains(&slot),
        "{} must be between 1 and 8, got {}",
        var,
        slot
    );
    slot
}
