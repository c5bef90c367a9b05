pub mod calibration;
pub mod ensemble;
pub mod models;

pub use calibration::IsotonicCalibrator;
pub use ensemble::*;
pub use models::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Category;

/// Probabilities closer than this are treated as equal when ranking.
pub const TIE_EPSILON: f64 = 1e-9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
    #[error("Classifier not loaded")]
    ClassifierNotLoaded,

    #[error("Feature vector has {actual} dimensions, classifier expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Calibrated prediction for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    /// Probability of `category`, in [0,1].
    pub confidence: f64,
    /// Sums to 1 within floating-point tolerance.
    pub distribution: BTreeMap<Category, f64>,
    /// Highest probability first. Ties go to the smaller label.
    pub ranking: Vec<(Category, f64)>,
}

impl ClassificationResult {
    /// Build from a normalized distribution aligned with `labels`.
    /// `labels` must be non-empty.
    pub fn from_probabilities(labels: &[Category], probabilities: &[f64]) -> Self {
        let ranking = rank(labels.iter().copied().zip(probabilities.iter().copied()).collect());
        let (category, confidence) = ranking[0];
        Self {
            category,
            confidence,
            distribution: ranking.iter().copied().collect(),
            ranking,
        }
    }
}

/// Sort descending, then reorder each run of near-equal probabilities by label.
fn rank(mut ranking: Vec<(Category, f64)>) -> Vec<(Category, f64)> {
    ranking.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.as_str().cmp(b.0.as_str())));

    let mut start = 0;
    while start < ranking.len() {
        let head = ranking[start].1;
        let mut end = start + 1;
        while end < ranking.len() && head - ranking[end].1 <= TIE_EPSILON {
            end += 1;
        }
        ranking[start..end].sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
        start = end;
    }
    ranking
}

/// Scale to sum 1; a distribution that collapsed to zero becomes uniform.
pub(crate) fn renormalize(probabilities: &mut [f64]) {
    let total: f64 = probabilities.iter().sum();
    if total > 0.0 && total.is_finite() {
        probabilities.iter_mut().for_each(|p| *p /= total);
    } else {
        let uniform = 1.0 / probabilities.len().max(1) as f64;
        probabilities.iter_mut().for_each(|p| *p = uniform);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranking_is_descending() {
        let result = ClassificationResult::from_probabilities(
            &[Category::Contract, Category::Invoice, Category::Report],
            &[0.2, 0.7, 0.1],
        );
        assert_eq!(result.category, Category::Invoice);
        assert!((result.confidence - 0.7).abs() < 1e-12);
        let order: Vec<Category> = result.ranking.iter().map(|(c, _)| *c).collect();
        assert_eq!(order, vec![Category::Invoice, Category::Contract, Category::Report]);
        assert_eq!(result.distribution.len(), 3);
    }

    #[test]
    fn exact_tie_goes_to_smaller_label() {
        let result = ClassificationResult::from_probabilities(
            &[Category::Report, Category::Judgment],
            &[0.5, 0.5],
        );
        assert_eq!(result.category, Category::Judgment);
    }

    #[test]
    fn near_tie_within_epsilon_goes_to_smaller_label() {
        let result = ClassificationResult::from_probabilities(
            &[Category::Invoice, Category::Contract, Category::Report],
            &[0.45 + 4e-10, 0.45, 0.1 - 4e-10],
        );
        assert_eq!(result.category, Category::Contract);
        assert_eq!(result.ranking[1].0, Category::Invoice);
        assert_eq!(result.ranking[2].0, Category::Report);
    }

    #[test]
    fn gap_above_epsilon_is_not_a_tie() {
        let result = ClassificationResult::from_probabilities(
            &[Category::Invoice, Category::Contract],
            &[0.5 + 1e-6, 0.5 - 1e-6],
        );
        assert_eq!(result.category, Category::Invoice);
    }

    #[test]
    fn renormalize_handles_collapse() {
        let mut p = vec![0.2, 0.6];
        renormalize(&mut p);
        assert!((p[0] - 0.25).abs() < 1e-12 && (p[1] - 0.75).abs() < 1e-12);

        let mut zero = vec![0.0; 4];
        renormalize(&mut zero);
        assert_eq!(zero, vec![0.25; 4]);
    }
}
