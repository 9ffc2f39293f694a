//! Post-processing of raw model outputs
//!
//! Turns a raw regression value into the integer AQI returned to callers.

use crate::error::ModelError;
use crate::models::AqiBounds;

/// Validate, clamp into `bounds` and round a raw model output.
///
/// A non-finite value counts as a failed invocation so the executor can retry.
pub fn finalize_prediction(raw: f64, bounds: AqiBounds) -> Result<i64, ModelError> {
    if !raw.is_finite() {
        return Err(ModelError::NonFinite);
    }
    Ok(bounds.clamp_round(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_values_are_rounded() {
        assert_eq!(finalize_prediction(64.4, AqiBounds::MODEL), Ok(64));
        assert_eq!(finalize_prediction(64.6, AqiBounds::MODEL), Ok(65));
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        assert_eq!(finalize_prediction(-20.0, AqiBounds::MODEL), Ok(15));
        assert_eq!(finalize_prediction(1e9, AqiBounds::MODEL), Ok(150));
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        assert_eq!(finalize_prediction(f64::NAN, AqiBounds::MODEL), Err(ModelError::NonFinite));
        assert_eq!(
            finalize_prediction(f64::INFINITY, AqiBounds::MODEL),
            Err(ModelError::NonFinite)
        );
    }
}
