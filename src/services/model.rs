//! Trained model artifact loading.
//!
//! The feature scaler and the crop classifier are produced by an external
//! training pipeline and exported as JSON artifacts. This module loads and
//! validates them at startup; after that they are immutable and shared
//! read-only across requests.
//!
//! The inference core talks to the artifacts only through the
//! [`FeatureScaler`] and [`CropClassifier`] traits, so the serialized format
//! can change without touching the decision logic.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use crate::crops;

/// Number of input features, in fixed order: temperature, humidity, pH, rainfall.
pub const NUM_FEATURES: usize = 4;

/// Errors that can occur while loading a model artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("IO error reading artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid artifact value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

fn invalid(field: &str, message: impl Into<String>) -> ArtifactError {
    ArtifactError::InvalidValue {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Pre-fitted per-feature normalization applied to raw readings.
pub trait FeatureScaler: Send + Sync {
    fn transform(&self, features: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES];
}

/// Output of one classification: the predicted label and the probability
/// distribution over all classes, in class-index order.
#[derive(Debug, Clone)]
pub struct Classification {
    pub label: u32,
    pub probabilities: Vec<f64>,
}

/// Pre-trained multi-class classifier over scaled feature vectors.
pub trait CropClassifier: Send + Sync {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> Classification;
    fn num_classes(&self) -> usize;
}

// ---------------------------------------------------------------------------
// Scaler artifact
// ---------------------------------------------------------------------------

/// Mean/scale normalization fitted by the training pipeline (scaler.json).
#[derive(Debug, Clone, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Load and validate a scaler artifact from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ArtifactError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate a scaler artifact from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, ArtifactError> {
        let scaler: Self = serde_json::from_str(raw)?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.mean.len() != NUM_FEATURES {
            return Err(invalid(
                "mean",
                format!("expected {} entries, got {}", NUM_FEATURES, self.mean.len()),
            ));
        }
        if self.scale.len() != NUM_FEATURES {
            return Err(invalid(
                "scale",
                format!("expected {} entries, got {}", NUM_FEATURES, self.scale.len()),
            ));
        }
        for (i, s) in self.scale.iter().enumerate() {
            if !s.is_finite() || *s == 0.0 {
                return Err(invalid(
                    "scale",
                    format!("entry {} must be finite and non-zero, got {}", i, s),
                ));
            }
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(invalid("mean", "all entries must be finite"));
        }
        Ok(())
    }
}

impl FeatureScaler for StandardScaler {
    fn transform(&self, features: &[f64; NUM_FEATURES]) -> [f64; NUM_FEATURES] {
        let mut scaled = [0.0; NUM_FEATURES];
        for i in 0..NUM_FEATURES {
            scaled[i] = (features[i] - self.mean[i]) / self.scale[i];
        }
        scaled
    }
}

// ---------------------------------------------------------------------------
// Classifier artifact
// ---------------------------------------------------------------------------

/// Multinomial linear classifier exported by the training pipeline
/// (crop_model.json): one coefficient row and intercept per class, with the
/// class-label vector giving each row's crop label.
#[derive(Debug, Clone, Deserialize)]
pub struct SoftmaxClassifier {
    classes: Vec<u32>,
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl SoftmaxClassifier {
    /// Load and validate a classifier artifact from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ArtifactError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parse and validate a classifier artifact from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, ArtifactError> {
        let model: Self = serde_json::from_str(raw)?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        // The probability distribution is indexed positionally (cotton =
        // index 3, label 4), so the artifact must carry the full fixed class
        // set in label order.
        if self.classes.len() != crops::NUM_CLASSES {
            return Err(invalid(
                "classes",
                format!(
                    "expected {} classes, got {}",
                    crops::NUM_CLASSES,
                    self.classes.len()
                ),
            ));
        }
        if self.classes.iter().enumerate().any(|(i, c)| *c != i as u32 + 1) {
            return Err(invalid(
                "classes",
                format!("must be the contiguous label set 1..={}", crops::NUM_CLASSES),
            ));
        }
        if self.coefficients.len() != self.classes.len() {
            return Err(invalid(
                "coefficients",
                format!(
                    "expected {} rows, got {}",
                    self.classes.len(),
                    self.coefficients.len()
                ),
            ));
        }
        if self.intercepts.len() != self.classes.len() {
            return Err(invalid(
                "intercepts",
                format!(
                    "expected {} entries, got {}",
                    self.classes.len(),
                    self.intercepts.len()
                ),
            ));
        }
        for (i, row) in self.coefficients.iter().enumerate() {
            if row.len() != NUM_FEATURES {
                return Err(invalid(
                    "coefficients",
                    format!(
                        "row {} has {} weights, expected {}",
                        i,
                        row.len(),
                        NUM_FEATURES
                    ),
                ));
            }
            if row.iter().any(|w| !w.is_finite()) {
                return Err(invalid(
                    "coefficients",
                    format!("row {} contains a non-finite weight", i),
                ));
            }
        }
        if self.intercepts.iter().any(|b| !b.is_finite()) {
            return Err(invalid("intercepts", "all entries must be finite"));
        }
        Ok(())
    }

    fn scores(&self, features: &[f64; NUM_FEATURES]) -> Vec<f64> {
        self.coefficients
            .iter()
            .zip(self.intercepts.iter())
            .map(|(row, b)| {
                row.iter()
                    .zip(features.iter())
                    .map(|(w, x)| w * x)
                    .sum::<f64>()
                    + b
            })
            .collect()
    }
}

impl CropClassifier for SoftmaxClassifier {
    fn predict(&self, features: &[f64; NUM_FEATURES]) -> Classification {
        let probabilities = softmax(&self.scores(features));

        // First maximum wins on ties; validation guarantees at least one class.
        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }

        Classification {
            label: self.classes[best],
            probabilities,
        }
    }

    fn num_classes(&self) -> usize {
        self.classes.len()
    }
}

/// Numerically stable softmax: shift by the maximum score before
/// exponentiating so large scores don't overflow.
pub fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}
