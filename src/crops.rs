//! Fixed crop label table.
//!
//! The classifier was trained against integer labels 1..=22; this module is
//! the bidirectional mapping between those labels and crop names. The table
//! is immutable configuration data — the training pipeline and this service
//! must agree on it exactly.

/// Number of crop classes the classifier distinguishes.
pub const NUM_CLASSES: usize = 22;

/// Label assigned to cotton by the training pipeline.
pub const COTTON_LABEL: u32 = 4;

/// Zero-based index of the cotton class in the probability distribution.
pub const COTTON_CLASS_INDEX: usize = 3;

/// Sentinel crop name for labels outside the table.
pub const UNKNOWN_CROP: &str = "Unknown";

/// Label → crop name, in label order (label = index + 1).
const CROP_NAMES: [&str; NUM_CLASSES] = [
    "rice",
    "maize",
    "jute",
    "cotton",
    "coconut",
    "papaya",
    "orange",
    "apple",
    "muskmelon",
    "watermelon",
    "grapes",
    "mango",
    "banana",
    "pomegranate",
    "lentil",
    "blackgram",
    "mungbean",
    "mothbeans",
    "pigeonpeas",
    "kidneybeans",
    "chickpea",
    "coffee",
];

/// Look up the crop name for a classifier label.
///
/// Returns `None` for labels outside 1..=22 — callers degrade to
/// [`UNKNOWN_CROP`] rather than failing the whole prediction.
pub fn crop_name(label: u32) -> Option<&'static str> {
    if label == 0 {
        return None;
    }
    CROP_NAMES.get(label as usize - 1).copied()
}

/// Crop name for a label, falling back to the `"Unknown"` sentinel.
pub fn crop_name_or_unknown(label: u32) -> &'static str {
    crop_name(label).unwrap_or(UNKNOWN_CROP)
}

/// Reverse lookup: label for a crop name (exact, lowercase).
#[allow(dead_code)] // reverse direction of the bidirectional table
pub fn crop_label(name: &str) -> Option<u32> {
    CROP_NAMES
        .iter()
        .position(|&n| n == name)
        .map(|i| i as u32 + 1)
}
