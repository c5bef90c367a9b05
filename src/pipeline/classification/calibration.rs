use serde::{Deserialize, Serialize};

use crate::pipeline::model::ModelLoadError;

/// Monotone piecewise-linear map fitted by isotonic regression.
/// Inputs outside the fitted range are clipped to the end values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsotonicCalibrator {
    pub x_thresholds: Vec<f64>,
    pub y_thresholds: Vec<f64>,
}

impl IsotonicCalibrator {
    pub fn validate(&self) -> Result<(), ModelLoadError> {
        let (x, y) = (&self.x_thresholds, &self.y_thresholds);
        if x.is_empty() || x.len() != y.len() {
            return Err(ModelLoadError::Invalid(format!(
                "calibrator needs matching non-empty breakpoints (x: {}, y: {})",
                x.len(),
                y.len()
            )));
        }
        if x.iter().any(|v| !v.is_finite()) || x.windows(2).any(|w| w[0] > w[1]) {
            return Err(ModelLoadError::Invalid(
                "calibrator x breakpoints must be finite and sorted".into(),
            ));
        }
        if y.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(ModelLoadError::Invalid(
                "calibrator y breakpoints must lie in [0, 1]".into(),
            ));
        }
        Ok(())
    }

    pub fn apply(&self, p: f64) -> f64 {
        let (x, y) = (&self.x_thresholds, &self.y_thresholds);
        let last = x.len() - 1;
        if p <= x[0] {
            return y[0];
        }
        if p >= x[last] {
            return y[last];
        }

        // x[hi - 1] <= p < x[hi], so the segment has non-zero width
        let hi = x.partition_point(|&v| v <= p);
        let lo = hi - 1;
        let t = (p - x[lo]) / (x[hi] - x[lo]);
        y[lo] + t * (y[hi] - y[lo])
    }
}
