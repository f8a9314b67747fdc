//! Shared helpers for Decimal ↔ f64 conversions.
//!
//! Probabilities cross the API boundary as percentages rounded to exactly
//! 2 decimal places; going through a formatted string keeps the rounding
//! identical to what the response serializer prints.
//!
//! Non-finite inputs (NaN, ±Inf) convert to `Decimal::ZERO`.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Convert an f64 to Decimal, rounded to 2 decimal places.
///
/// Used for probability percentages where 0.01% resolution is the
/// advertised contract.
pub(crate) fn f64_to_decimal_2dp(v: f64) -> Decimal {
    if !v.is_finite() {
        tracing::warn!(
            "f64_to_decimal_2dp received non-finite value {}, defaulting to 0",
            v
        );
        return Decimal::ZERO;
    }
    Decimal::from_str_exact(&format!("{:.2}", v)).unwrap_or_default()
}

/// Convert a Decimal to f64, defaulting to 0.0 for values that can't be represented.
pub(crate) fn dec_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}
