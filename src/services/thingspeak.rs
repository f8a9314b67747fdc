//! ThingSpeak channel-feed client.
//!
//! Fetches the latest record from a ThingSpeak IoT channel and maps its
//! numeric field slots onto a [`Reading`].
//! See: https://www.mathworks.com/help/thingspeak/readdata.html
//!
//! Which slot carries which quantity is channel configuration, not protocol:
//! the upstream channel history stored pH in `field3` before moving it to
//! `field5`, so the slot assignment is an explicit [`FieldMapping`] instead
//! of a hard-coded assumption.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::errors::AppError;
use crate::services::inference::Reading;

/// Production ThingSpeak API base URL.
pub const THINGSPEAK_BASE_URL: &str = "https://api.thingspeak.com";

/// Which feed slot (`field1`..`field8`) holds which reading.
#[derive(Debug, Clone, Copy)]
pub struct FieldMapping {
    pub temperature: u8,
    pub humidity: u8,
    pub ph: u8,
    pub rainfall: u8,
}

impl Default for FieldMapping {
    /// Latest upstream channel layout: temperature=1, humidity=2, pH=5, rainfall=4.
    fn default() -> Self {
        Self {
            temperature: 1,
            humidity: 2,
            ph: 5,
            rainfall: 4,
        }
    }
}

/// Client for the ThingSpeak channel-feed API.
#[derive(Debug, Clone)]
pub struct ThingSpeakClient {
    client: reqwest::Client,
    base_url: String,
    mapping: FieldMapping,
}

// --- ThingSpeak JSON response types ---

#[derive(Debug, Deserialize)]
struct FeedsResponse {
    #[serde(default)]
    feeds: Vec<FeedEntry>,
}

/// One feed record. Field slots are dynamic (`field1`..`field8`) and
/// serialized as strings by ThingSpeak, so they are captured as raw values.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    created_at: Option<String>,
    #[serde(flatten)]
    fields: HashMap<String, serde_json::Value>,
}

impl ThingSpeakClient {
    pub fn new(base_url: &str, mapping: FieldMapping) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            mapping,
        }
    }

    /// Fetch the latest reading from a channel.
    ///
    /// Every failure mode — network error, non-2xx status, malformed JSON,
    /// empty feed list, missing or non-numeric field — surfaces as a
    /// recoverable `ExternalServiceError`; no reading is produced.
    pub async fn fetch_latest_reading(
        &self,
        channel_id: &str,
        api_key: &str,
    ) -> Result<Reading, AppError> {
        let url = format!("{}/channels/{}/feeds.json", self.base_url, channel_id);

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", api_key), ("results", "1")])
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("ThingSpeak request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "ThingSpeak returned HTTP {}",
                response.status()
            )));
        }

        let feeds: FeedsResponse = response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("ThingSpeak JSON parse error: {}", e))
        })?;

        let entry = feeds.feeds.first().ok_or_else(|| {
            AppError::ExternalServiceError("ThingSpeak returned an empty feed list".to_string())
        })?;

        let reading = reading_from_entry(entry, &self.mapping)?;
        tracing::debug!(
            channel_id,
            temperature = reading.temperature,
            humidity = reading.humidity,
            ph = reading.ph,
            rainfall = reading.rainfall,
            "fetched telemetry reading"
        );
        Ok(reading)
    }
}

/// Map a feed entry onto a `Reading` using the configured slot assignment.
///
/// Pure function (no I/O) — separated from the fetch so the mapping logic
/// is testable against fixture JSON.
fn reading_from_entry(entry: &FeedEntry, mapping: &FieldMapping) -> Result<Reading, AppError> {
    Ok(Reading {
        temperature: field_value(entry, mapping.temperature)?,
        humidity: field_value(entry, mapping.humidity)?,
        ph: field_value(entry, mapping.ph)?,
        rainfall: field_value(entry, mapping.rainfall)?,
        observed_at: entry
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)),
    })
}

/// Extract a numeric value from a feed slot.
///
/// ThingSpeak serializes field values as JSON strings; bare numbers are
/// accepted too. Absent slots, nulls and non-numeric strings all fail.
fn field_value(entry: &FeedEntry, slot: u8) -> Result<f64, AppError> {
    let key = format!("field{}", slot);
    let value = entry.fields.get(&key).ok_or_else(|| {
        AppError::ExternalServiceError(format!("ThingSpeak feed is missing {}", key))
    })?;

    match value {
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            AppError::ExternalServiceError(format!(
                "ThingSpeak feed {} is not numeric: '{}'",
                key, s
            ))
        }),
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
            AppError::ExternalServiceError(format!("ThingSpeak feed {} is not numeric", key))
        }),
        _ => Err(AppError::ExternalServiceError(format!(
            "ThingSpeak feed {} is not numeric",
            key
        ))),
    }
}
