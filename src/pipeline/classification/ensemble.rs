use serde::{Deserialize, Serialize};

use super::calibration::IsotonicCalibrator;
use super::models::{BaseModel, ProbabilityModel};
use super::{renormalize, ClassificationResult, ClassifyError};
use crate::models::Category;
use crate::pipeline::encoding::FeatureVector;
use crate::pipeline::model::ModelLoadError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleMember {
    #[serde(default = "default_weight")]
    pub weight: f64,
    pub model: BaseModel,
}

fn default_weight() -> f64 {
    1.0
}

/// Fitted ensemble as stored in the model bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleParams {
    pub n_features: usize,
    pub members: Vec<EnsembleMember>,
    /// One calibrator per label, in label order. Absent means uncalibrated.
    #[serde(default)]
    pub calibrators: Option<Vec<IsotonicCalibrator>>,
}

/// Weighted soft vote over the base models, then per-class calibration.
pub struct EnsembleClassifier {
    labels: Vec<Category>,
    params: EnsembleParams,
}

impl EnsembleClassifier {
    pub fn new(labels: Vec<Category>, params: EnsembleParams) -> Result<Self, ModelLoadError> {
        if labels.is_empty() {
            return Err(ModelLoadError::Invalid("no labels".into()));
        }
        for (i, label) in labels.iter().enumerate() {
            if labels[..i].contains(label) {
                return Err(ModelLoadError::Invalid(format!("duplicate label {label}")));
            }
        }

        if params.members.is_empty() {
            return Err(ModelLoadError::Invalid("ensemble has no members".into()));
        }
        let weights_ok = params
            .members
            .iter()
            .all(|m| m.weight.is_finite() && m.weight >= 0.0);
        let total: f64 = params.members.iter().map(|m| m.weight).sum();
        if !weights_ok || total <= 0.0 {
            return Err(ModelLoadError::Invalid(
                "member weights must be non-negative with a positive sum".into(),
            ));
        }
        for member in &params.members {
            member.model.validate(labels.len(), params.n_features)?;
        }

        if let Some(calibrators) = &params.calibrators {
            if calibrators.len() != labels.len() {
                return Err(ModelLoadError::Invalid(format!(
                    "{} calibrators for {} labels",
                    calibrators.len(),
                    labels.len()
                )));
            }
            for calibrator in calibrators {
                calibrator.validate()?;
            }
        }

        Ok(Self { labels, params })
    }

    pub fn labels(&self) -> &[Category] {
        &self.labels
    }

    pub fn n_features(&self) -> usize {
        self.params.n_features
    }

    pub fn is_calibrated(&self) -> bool {
        self.params.calibrators.is_some()
    }

    /// `(kind, weight)` for each member, in bundle order.
    pub fn members(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.params.members.iter().map(|m| (m.model.kind(), m.weight))
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<ClassificationResult, ClassifyError> {
        if features.len() != self.params.n_features {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.params.n_features,
                actual: features.len(),
            });
        }

        let x = features.as_slice();
        let mut vote = vec![0.0f64; self.labels.len()];
        let mut total_weight = 0.0;
        for member in &self.params.members {
            if member.weight == 0.0 {
                continue;
            }
            let probs = member.model.predict_proba(x);
            vote.iter_mut()
                .zip(&probs)
                .for_each(|(v, p)| *v += member.weight * p);
            total_weight += member.weight;
        }
        vote.iter_mut().for_each(|v| *v /= total_weight);

        if let Some(calibrators) = &self.params.calibrators {
            vote.iter_mut()
                .zip(calibrators)
                .for_each(|(p, c)| *p = c.apply(*p));
        }
        renormalize(&mut vote);

        let result = ClassificationResult::from_probabilities(&self.labels, &vote);
        tracing::debug!(
            category = result.category.as_str(),
            confidence = result.confidence,
            "Classification complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classification::models::tests::{forest, margin, naive_bayes};

    const LABELS: [Category; 2] = [Category::Contract, Category::Invoice];

    fn params() -> EnsembleParams {
        EnsembleParams {
            n_features: 2,
            members: vec![
                EnsembleMember {
                    weight: 1.0,
                    model: BaseModel::NaiveBayes(naive_bayes()),
                },
                EnsembleMember {
                    weight: 1.0,
                    model: BaseModel::RandomForest(forest()),
                },
                EnsembleMember {
                    weight: 2.0,
                    model: BaseModel::LinearMargin(margin()),
                },
            ],
            calibrators: None,
        }
    }

    fn classifier(params: EnsembleParams) -> EnsembleClassifier {
        EnsembleClassifier::new(LABELS.to_vec(), params).unwrap()
    }

    #[test]
    fn weighted_soft_vote() {
        let result = classifier(params())
            .predict(&FeatureVector::new(vec![1.0, 0.0]))
            .unwrap();
        let s = 1.0 / (1.0 + (-2.0f64).exp());
        let expected = (0.8 + 0.75 + 2.0 * s) / 4.0;
        assert_eq!(result.category, Category::Contract);
        assert!((result.confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn probabilities_sum_to_one_and_stay_in_bounds() {
        let mut p = params();
        p.calibrators = Some(vec![
            IsotonicCalibrator {
                x_thresholds: vec![0.0, 1.0],
                y_thresholds: vec![0.0, 0.5],
            },
            IsotonicCalibrator {
                x_thresholds: vec![0.0, 0.3, 1.0],
                y_thresholds: vec![0.1, 0.2, 1.0],
            },
        ]);
        let classifier = classifier(p);

        for x in [[1.0, 0.0], [0.0, 1.0], [0.0, 0.0], [0.3, 0.7], [12.0, 4.0]] {
            let result = classifier.predict(&FeatureVector::new(x.to_vec())).unwrap();
            let sum: f64 = result.distribution.values().sum();
            assert!((sum - 1.0).abs() < 1e-6, "sum {sum} for {x:?}");
            assert!(result.distribution.values().all(|p| (0.0..=1.0).contains(p)));
            assert_eq!(result.confidence, result.ranking[0].1);
        }
    }

    #[test]
    fn calibration_collapse_becomes_uniform_tie() {
        let mut p = params();
        let zero = IsotonicCalibrator {
            x_thresholds: vec![0.0, 1.0],
            y_thresholds: vec![0.0, 0.0],
        };
        p.calibrators = Some(vec![zero.clone(), zero]);

        let result = classifier(p)
            .predict(&FeatureVector::new(vec![0.0, 1.0]))
            .unwrap();
        assert_eq!(result.category, Category::Contract);
        assert!((result.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn zero_vector_is_a_legal_input() {
        let result = classifier(params()).predict(&FeatureVector::zeros(2)).unwrap();
        assert!(result.confidence < 0.6);
    }

    #[test]
    fn dimension_mismatch() {
        let err = classifier(params())
            .predict(&FeatureVector::zeros(3))
            .unwrap_err();
        assert_eq!(
            err,
            ClassifyError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[test]
    fn zero_weight_member_is_ignored() {
        let mut p = params();
        p.members[0].weight = 0.0;
        p.members[2].weight = 0.0;
        let result = classifier(p)
            .predict(&FeatureVector::new(vec![1.0, 0.0]))
            .unwrap();
        assert!((result.confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn invalid_ensembles_rejected() {
        assert!(EnsembleClassifier::new(vec![], params()).is_err());
        assert!(EnsembleClassifier::new(vec![Category::Contract, Category::Contract], params()).is_err());

        let mut p = params();
        p.members.clear();
        assert!(EnsembleClassifier::new(LABELS.to_vec(), p).is_err());

        let mut p = params();
        p.members.iter_mut().for_each(|m| m.weight = 0.0);
        assert!(EnsembleClassifier::new(LABELS.to_vec(), p).is_err());

        let mut p = params();
        p.n_features = 3;
        assert!(EnsembleClassifier::new(LABELS.to_vec(), p).is_err());

        let mut p = params();
        p.calibrators = Some(vec![]);
        assert!(EnsembleClassifier::new(LABELS.to_vec(), p).is_err());
    }

    #[test]
    fn member_summary() {
        let c = classifier(params());
        let members: Vec<_> = c.members().collect();
        assert_eq!(
            members,
            vec![("naive_bayes", 1.0), ("random_forest", 1.0), ("linear_margin", 2.0)]
        );
        assert!(!c.is_calibrated());
    }
}
