//! Crop inference engine.
//!
//! The pipeline is: assemble the four readings into a feature vector in
//! fixed order → scale → classify → map the label to a crop name. On top of
//! the classification sit two independent cotton signals:
//!
//! - the probability mass the model assigns to the cotton class, and
//! - a fixed-threshold range rule over the raw (unscaled) readings.
//!
//! The advice policy combines them with strict precedence: the rule verdict
//! overrides the model pick, and the model pick overrides the fallback.
//!
//! Crop selection is deterministic top-1 by default; the randomized top-k
//! mode is an explicit configuration flag, never silently active.

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::crops;
use crate::errors::AppError;
use crate::helpers::f64_to_decimal_2dp;
use crate::services::model::{Classification, CropClassifier, FeatureScaler, NUM_FEATURES};

// ---------------------------------------------------------------------------
// Cotton rule thresholds (all bounds inclusive)
// ---------------------------------------------------------------------------

/// Ideal temperature band for cotton (°C).
const COTTON_TEMPERATURE_C: RangeInclusive<f64> = 21.0..=30.0;

/// Ideal relative humidity band for cotton (%).
const COTTON_HUMIDITY_PCT: RangeInclusive<f64> = 50.0..=80.0;

/// Ideal soil pH band for cotton.
const COTTON_PH: RangeInclusive<f64> = 6.0..=7.5;

/// Ideal rainfall band for cotton (mm).
const COTTON_RAINFALL_MM: RangeInclusive<f64> = 600.0..=1200.0;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// A complete set of the four environmental readings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct Reading {
    /// Air temperature in °C
    pub temperature: f64,
    /// Relative humidity in %
    pub humidity: f64,
    /// Soil pH
    pub ph: f64,
    /// Rainfall in mm
    pub rainfall: f64,
    /// When the reading was taken (set for telemetry readings)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<Utc>>,
}

impl Reading {
    /// Feature vector in the order the scaler and classifier were fitted on.
    pub fn features(&self) -> [f64; NUM_FEATURES] {
        [self.temperature, self.humidity, self.ph, self.rainfall]
    }
}

/// Reading under construction, where every field may still be absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawReading {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub ph: Option<f64>,
    pub rainfall: Option<f64>,
}

impl RawReading {
    /// Promote to a complete [`Reading`], naming every missing field.
    ///
    /// Non-finite values (NaN, ±Inf) are rejected — NaN passes range
    /// comparisons silently, so it must never reach the cotton rule.
    pub fn complete(&self) -> Result<Reading, AppError> {
        match (self.temperature, self.humidity, self.ph, self.rainfall) {
            (Some(temperature), Some(humidity), Some(ph), Some(rainfall)) => {
                for (name, value) in [
                    ("temperature", temperature),
                    ("humidity", humidity),
                    ("ph", ph),
                    ("rainfall", rainfall),
                ] {
                    if !value.is_finite() {
                        return Err(AppError::BadRequest(format!(
                            "{} must be a finite number",
                            name
                        )));
                    }
                }
                Ok(Reading {
                    temperature,
                    humidity,
                    ph,
                    rainfall,
                    observed_at: None,
                })
            }
            _ => {
                let missing: Vec<&str> = [
                    ("temperature", self.temperature.is_none()),
                    ("humidity", self.humidity.is_none()),
                    ("ph", self.ph.is_none()),
                    ("rainfall", self.rainfall.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();
                Err(AppError::MissingInput(format!(
                    "missing reading field(s): {}",
                    missing.join(", ")
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Selection mode
// ---------------------------------------------------------------------------

/// How the predicted crop is selected from the probability distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionMode {
    /// Deterministic arg-max. Identical inputs yield identical output.
    Top1,
    /// Uniform random choice among the k most probable classes.
    TopK(usize),
}

impl FromStr for PredictionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let k = s
            .strip_prefix("top")
            .and_then(|rest| rest.parse::<usize>().ok())
            .ok_or_else(|| format!("unrecognized prediction mode '{}'", s))?;
        match k {
            0 => Err("top0 is not a valid prediction mode".to_string()),
            1 => Ok(PredictionMode::Top1),
            k => Ok(PredictionMode::TopK(k)),
        }
    }
}

impl std::fmt::Display for PredictionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PredictionMode::Top1 => write!(f, "top1"),
            PredictionMode::TopK(k) => write!(f, "top{}", k),
        }
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Cotton advice, in precedence order: the range rule beats the model pick,
/// the model pick beats the fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CottonAdvice {
    /// The range rule holds — conditions are ideal regardless of the model.
    Ideal,
    /// Rule fails but the selected crop is cotton.
    SuggestedNotIdeal,
    /// Rule fails and the model prefers another crop.
    BetterSuited { crop: &'static str },
}

impl CottonAdvice {
    pub fn status(&self) -> &'static str {
        match self {
            CottonAdvice::Ideal => "ideal",
            CottonAdvice::SuggestedNotIdeal => "suggested_not_ideal",
            CottonAdvice::BetterSuited { .. } => "better_suited",
        }
    }

    pub fn message(&self) -> String {
        match self {
            CottonAdvice::Ideal => "Conditions are ideal for cotton.".to_string(),
            CottonAdvice::SuggestedNotIdeal => {
                "Conditions aren't ideal, but the model still suggests cotton.".to_string()
            }
            CottonAdvice::BetterSuited { crop } => {
                format!("Not ideal for cotton. Better suited to {}.", crop)
            }
        }
    }
}

/// Both cotton signals plus the combined advice.
#[derive(Debug, Clone)]
pub struct CottonAssessment {
    /// Model probability for the cotton class, as a percentage (2 dp).
    pub probability_pct: Decimal,
    /// Verdict of the fixed-threshold range rule.
    pub ideal: bool,
    pub advice: CottonAdvice,
}

/// Result of one inference call.
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Classifier label of the selected crop.
    pub label: u32,
    /// Crop name, or the `"Unknown"` sentinel for labels outside the table.
    pub crop: &'static str,
    /// Cotton detail, present when requested.
    pub cotton: Option<CottonAssessment>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The inference engine: loaded artifacts plus the selection mode.
///
/// Immutable after construction — safe to share across requests.
pub struct InferenceEngine {
    scaler: Box<dyn FeatureScaler>,
    classifier: Box<dyn CropClassifier>,
    mode: PredictionMode,
}

impl InferenceEngine {
    pub fn new(
        scaler: Box<dyn FeatureScaler>,
        classifier: Box<dyn CropClassifier>,
        mode: PredictionMode,
    ) -> Self {
        Self {
            scaler,
            classifier,
            mode,
        }
    }

    pub fn mode(&self) -> PredictionMode {
        self.mode
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.num_classes()
    }

    /// Validate a wire-level reading and predict.
    ///
    /// A missing field refuses before the scaler or classifier is touched.
    pub fn predict(&self, raw: &RawReading, cotton_details: bool) -> Result<Prediction, AppError> {
        let reading = raw.complete()?;
        Ok(self.predict_reading(&reading, cotton_details))
    }

    /// Predict from a complete reading.
    pub fn predict_reading(&self, reading: &Reading, cotton_details: bool) -> Prediction {
        let scaled = self.scaler.transform(&reading.features());
        let classification = self.classifier.predict(&scaled);

        let label = match self.mode {
            PredictionMode::Top1 => classification.label,
            PredictionMode::TopK(k) => {
                let index =
                    sample_top_k(&classification.probabilities, k, &mut rand::thread_rng());
                index as u32 + 1
            }
        };
        let crop = crops::crop_name_or_unknown(label);

        let cotton = if cotton_details {
            Some(assess_cotton(reading, label, crop, &classification))
        } else {
            None
        };

        tracing::debug!(label, crop, mode = %self.mode, "prediction complete");

        Prediction {
            label,
            crop,
            cotton,
        }
    }
}

/// Fixed-threshold cotton rule over the raw readings, all bounds inclusive.
///
/// Independent of the model: evaluated even when the classifier prefers a
/// different crop.
pub fn is_ideal_for_cotton(reading: &Reading) -> bool {
    COTTON_TEMPERATURE_C.contains(&reading.temperature)
        && COTTON_HUMIDITY_PCT.contains(&reading.humidity)
        && COTTON_PH.contains(&reading.ph)
        && COTTON_RAINFALL_MM.contains(&reading.rainfall)
}

/// Compute both cotton signals and fold them into advice.
fn assess_cotton(
    reading: &Reading,
    selected_label: u32,
    selected_crop: &'static str,
    classification: &Classification,
) -> CottonAssessment {
    let cotton_mass = classification
        .probabilities
        .get(crops::COTTON_CLASS_INDEX)
        .copied()
        .unwrap_or(0.0);
    let probability_pct = f64_to_decimal_2dp(cotton_mass * 100.0);

    let ideal = is_ideal_for_cotton(reading);
    let advice = if ideal {
        CottonAdvice::Ideal
    } else if selected_label == crops::COTTON_LABEL {
        CottonAdvice::SuggestedNotIdeal
    } else {
        CottonAdvice::BetterSuited {
            crop: selected_crop,
        }
    };

    CottonAssessment {
        probability_pct,
        ideal,
        advice,
    }
}

/// Pick a class index uniformly among the k most probable classes.
///
/// k is clamped to the number of classes. Ties at the cut-off keep the
/// lower index, matching the deterministic arg-max convention.
fn sample_top_k(probabilities: &[f64], k: usize, rng: &mut impl Rng) -> usize {
    let mut indices: Vec<usize> = (0..probabilities.len()).collect();
    indices.sort_by(|&a, &b| {
        probabilities[b]
            .partial_cmp(&probabilities[a])
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.cmp(&b))
    });
    let k = k.clamp(1, indices.len().max(1));
    indices[rng.gen_range(0..k)]
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Identity scaler — tests feed pre-scaled features.
    struct StubScaler;

    impl FeatureScaler for StubScaler {
        fn transform(&self, features: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
            *features
        }
    }

    /// Classifier returning a fixed label and distribution.
    struct StubClassifier {
        label: u32,
        probabilities: Vec<f64>,
    }

    impl CropClassifier for StubClassifier {
        fn predict(&self, _features: &[f64; NUM_FEATURES]) -> Classification {
            Classification {
                label: self.label,
                probabilities: self.probabilities.clone(),
            }
        }

        fn num_classes(&self) -> usize {
            self.probabilities.len()
        }
    }

    /// Classifier that must never be reached.
    struct PanickingClassifier;

    impl CropClassifier for PanickingClassifier {
        fn predict(&self, _features: &[f64; NUM_FEATURES]) -> Classification {
            panic!("classifier invoked on incomplete input");
        }

        fn num_classes(&self) -> usize {
            22
        }
    }

    fn reading(temperature: f64, humidity: f64, ph: f64, rainfall: f64) -> Reading {
        Reading {
            temperature,
            humidity,
            ph,
            rainfall,
            observed_at: None,
        }
    }

    /// 22-class distribution with `mass` at `index` and the rest uniform.
    fn dist_with(index: usize, mass: f64) -> Vec<f64> {
        let rest = (1.0 - mass) / 21.0;
        let mut probs = vec![rest; 22];
        probs[index] = mass;
        probs
    }

    fn engine_with(label: u32, probabilities: Vec<f64>, mode: PredictionMode) -> InferenceEngine {
        InferenceEngine::new(
            Box::new(StubScaler),
            Box::new(StubClassifier {
                label,
                probabilities,
            }),
            mode,
        )
    }

    // --- Cotton rule ---

    #[test]
    fn test_cotton_rule_low_rainfall() {
        // 100 mm is well below the 600 mm floor
        assert!(!is_ideal_for_cotton(&reading(25.0, 70.0, 6.5, 100.0)));
    }

    #[test]
    fn test_cotton_rule_holds() {
        assert!(is_ideal_for_cotton(&reading(25.0, 70.0, 6.5, 800.0)));
    }

    #[test]
    fn test_cotton_rule_temperature_bounds_inclusive() {
        assert!(is_ideal_for_cotton(&reading(21.0, 70.0, 6.5, 800.0)));
        assert!(is_ideal_for_cotton(&reading(30.0, 70.0, 6.5, 800.0)));
        assert!(!is_ideal_for_cotton(&reading(20.99, 70.0, 6.5, 800.0)));
        assert!(!is_ideal_for_cotton(&reading(30.01, 70.0, 6.5, 800.0)));
    }

    #[test]
    fn test_cotton_rule_humidity_bounds() {
        assert!(is_ideal_for_cotton(&reading(25.0, 50.0, 6.5, 800.0)));
        assert!(is_ideal_for_cotton(&reading(25.0, 80.0, 6.5, 800.0)));
        assert!(!is_ideal_for_cotton(&reading(25.0, 49.9, 6.5, 800.0)));
        assert!(!is_ideal_for_cotton(&reading(25.0, 80.1, 6.5, 800.0)));
    }

    #[test]
    fn test_cotton_rule_ph_bounds() {
        assert!(is_ideal_for_cotton(&reading(25.0, 70.0, 6.0, 800.0)));
        assert!(is_ideal_for_cotton(&reading(25.0, 70.0, 7.5, 800.0)));
        assert!(!is_ideal_for_cotton(&reading(25.0, 70.0, 5.9, 800.0)));
        assert!(!is_ideal_for_cotton(&reading(25.0, 70.0, 7.6, 800.0)));
    }

    #[test]
    fn test_cotton_rule_rainfall_bounds() {
        assert!(is_ideal_for_cotton(&reading(25.0, 70.0, 6.5, 600.0)));
        assert!(is_ideal_for_cotton(&reading(25.0, 70.0, 6.5, 1200.0)));
        assert!(!is_ideal_for_cotton(&reading(25.0, 70.0, 6.5, 1200.1)));
    }

    // --- Missing / malformed input ---

    #[test]
    fn test_missing_input_never_reaches_classifier() {
        let engine = InferenceEngine::new(
            Box::new(StubScaler),
            Box::new(PanickingClassifier),
            PredictionMode::Top1,
        );
        let raw = RawReading {
            temperature: Some(25.0),
            humidity: None,
            ph: Some(6.5),
            rainfall: None,
        };
        let err = engine.predict(&raw, true).unwrap_err();
        match err {
            AppError::MissingInput(msg) => {
                assert!(msg.contains("humidity"));
                assert!(msg.contains("rainfall"));
                assert!(!msg.contains("temperature"));
            }
            other => panic!("expected MissingInput, got {:?}", other),
        }
    }

    #[test]
    fn test_all_fields_missing() {
        let err = RawReading::default().complete().unwrap_err();
        assert!(matches!(err, AppError::MissingInput(_)));
    }

    #[test]
    fn test_non_finite_rejected() {
        let raw = RawReading {
            temperature: Some(f64::NAN),
            humidity: Some(70.0),
            ph: Some(6.5),
            rainfall: Some(800.0),
        };
        let err = raw.complete().unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    // --- Prediction + advice policy ---

    #[test]
    fn test_rule_overrides_model_pick() {
        // Model says rice (label 1) but conditions are ideal for cotton.
        let engine = engine_with(1, dist_with(0, 0.9), PredictionMode::Top1);
        let result = engine.predict_reading(&reading(25.0, 70.0, 6.5, 800.0), true);
        assert_eq!(result.crop, "rice");
        let cotton = result.cotton.unwrap();
        assert!(cotton.ideal);
        assert_eq!(cotton.advice, CottonAdvice::Ideal);
    }

    #[test]
    fn test_model_cotton_without_ideal_conditions() {
        let engine = engine_with(4, dist_with(3, 0.8), PredictionMode::Top1);
        let result = engine.predict_reading(&reading(35.0, 70.0, 6.5, 800.0), true);
        assert_eq!(result.crop, "cotton");
        let cotton = result.cotton.unwrap();
        assert!(!cotton.ideal);
        assert_eq!(cotton.advice, CottonAdvice::SuggestedNotIdeal);
    }

    #[test]
    fn test_better_suited_fallback() {
        let engine = engine_with(12, dist_with(11, 0.7), PredictionMode::Top1);
        let result = engine.predict_reading(&reading(35.0, 20.0, 5.0, 50.0), true);
        assert_eq!(result.crop, "mango");
        let cotton = result.cotton.unwrap();
        assert_eq!(
            cotton.advice,
            CottonAdvice::BetterSuited { crop: "mango" }
        );
        assert_eq!(cotton.advice.status(), "better_suited");
        assert!(cotton.advice.message().contains("mango"));
    }

    #[test]
    fn test_cotton_probability_rounded_to_2dp() {
        let engine = engine_with(1, dist_with(3, 0.876543), PredictionMode::Top1);
        let result = engine.predict_reading(&reading(25.0, 70.0, 6.5, 100.0), true);
        let cotton = result.cotton.unwrap();
        assert_eq!(cotton.probability_pct, Decimal::from_str("87.65").unwrap());
    }

    #[test]
    fn test_cotton_probability_bounds() {
        for mass in [0.0, 0.25, 1.0] {
            let engine = engine_with(1, dist_with(3, mass), PredictionMode::Top1);
            let result = engine.predict_reading(&reading(25.0, 70.0, 6.5, 100.0), true);
            let pct = crate::helpers::dec_to_f64(result.cotton.unwrap().probability_pct);
            assert!((0.0..=100.0).contains(&pct));
        }
    }

    #[test]
    fn test_cotton_details_omitted() {
        let engine = engine_with(1, dist_with(0, 0.9), PredictionMode::Top1);
        let result = engine.predict_reading(&reading(25.0, 70.0, 6.5, 100.0), false);
        assert!(result.cotton.is_none());
    }

    #[test]
    fn test_unknown_label_degrades_to_sentinel() {
        let engine = engine_with(99, dist_with(0, 0.9), PredictionMode::Top1);
        let result = engine.predict_reading(&reading(25.0, 70.0, 6.5, 100.0), true);
        assert_eq!(result.crop, "Unknown");
        // Unknown crop is not cotton and the rule fails → fallback branch.
        assert_eq!(
            result.cotton.unwrap().advice,
            CottonAdvice::BetterSuited { crop: "Unknown" }
        );
    }

    #[test]
    fn test_deterministic_mode_reproducible() {
        let engine = engine_with(4, dist_with(3, 0.6), PredictionMode::Top1);
        let r = reading(25.0, 70.0, 6.5, 800.0);
        let a = engine.predict_reading(&r, true);
        let b = engine.predict_reading(&r, true);
        assert_eq!(a.label, b.label);
        assert_eq!(a.crop, b.crop);
        assert_eq!(
            a.cotton.unwrap().probability_pct,
            b.cotton.unwrap().probability_pct
        );
    }

    // --- Top-k sampling ---

    #[test]
    fn test_sample_top_k_stays_in_top_set() {
        // Top-3 by mass: indices 3, 0, 11.
        let mut probs = vec![0.01; 22];
        probs[3] = 0.5;
        probs[0] = 0.2;
        probs[11] = 0.1;
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let picked = sample_top_k(&probs, 3, &mut rng);
            assert!([3, 0, 11].contains(&picked), "picked index {}", picked);
        }
    }

    #[test]
    fn test_sample_top_1_is_argmax() {
        let mut probs = vec![0.01; 22];
        probs[7] = 0.79;
        let mut rng = rand::thread_rng();
        assert_eq!(sample_top_k(&probs, 1, &mut rng), 7);
    }

    #[test]
    fn test_sample_top_k_clamps_oversized_k() {
        let probs = vec![0.5, 0.5];
        let mut rng = rand::thread_rng();
        let picked = sample_top_k(&probs, 10, &mut rng);
        assert!(picked < 2);
    }

    #[test]
    fn test_top_k_engine_samples_within_top_set() {
        let mut probs = vec![0.001; 22];
        probs[0] = 0.4; // rice
        probs[3] = 0.3; // cotton
        probs[21] = 0.25; // coffee
        let engine = engine_with(1, probs, PredictionMode::TopK(3));
        for _ in 0..50 {
            let result = engine.predict_reading(&reading(25.0, 70.0, 6.5, 100.0), false);
            assert!(
                ["rice", "cotton", "coffee"].contains(&result.crop),
                "sampled {}",
                result.crop
            );
        }
    }

    // --- Mode parsing ---

    #[test]
    fn test_mode_from_str() {
        assert_eq!(PredictionMode::from_str("top1").unwrap(), PredictionMode::Top1);
        assert_eq!(
            PredictionMode::from_str("top3").unwrap(),
            PredictionMode::TopK(3)
        );
        assert_eq!(
            PredictionMode::from_str("top5").unwrap(),
            PredictionMode::TopK(5)
        );
        assert!(PredictionMode::from_str("top0").is_err());
        assert!(PredictionMode::from_str("argmax").is_err());
    }

    #[test]
    fn test_mode_display_round_trips() {
        for mode in [PredictionMode::Top1, PredictionMode::TopK(5)] {
            let parsed: PredictionMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }
}
