//! Fitted model bundle: the TF-IDF encoder and the calibrated ensemble,
//! loaded once at startup and shared read-only by every worker.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::classification::{ClassificationResult, ClassifyError, EnsembleClassifier, EnsembleParams};
use super::encoding::{EncodeError, FeatureVector, TfidfEncoder, TfidfParams};
use crate::config::ConfigError;
use crate::models::Category;

/// Bundle layout version this build reads.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("I/O error reading model {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed model bundle: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unsupported bundle format version {found} (this build reads {expected})")]
    FormatVersion { found: u32, expected: u32 },

    #[error("Invalid model: {0}")]
    Invalid(String),

    #[error("Encoder produces {encoder} features but the classifier expects {classifier}")]
    DimensionMismatch { encoder: usize, classifier: usize },
}

impl From<ModelLoadError> for ConfigError {
    fn from(e: ModelLoadError) -> Self {
        ConfigError::Model(e.to_string())
    }
}

/// On-disk JSON layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBundle {
    pub format_version: u32,
    pub version: String,
    /// Class order of every probability vector in the bundle.
    pub labels: Vec<Category>,
    #[serde(default)]
    pub encoder: Option<TfidfParams>,
    #[serde(default)]
    pub classifier: Option<EnsembleParams>,
}

/// The two model capabilities the pipeline consumes.
pub trait DocumentModel: Send + Sync {
    fn labels(&self) -> &[Category];
    fn vectorize(&self, text: &str) -> Result<FeatureVector, EncodeError>;
    fn predict(&self, features: &FeatureVector) -> Result<ClassificationResult, ClassifyError>;
}

/// What `inspect-model` prints.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub version: String,
    pub format_version: u32,
    pub labels: Vec<Category>,
    pub vocabulary_size: Option<usize>,
    pub ngram_range: Option<(usize, usize)>,
    pub base_models: Vec<BaseModelSummary>,
    pub calibrated: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BaseModelSummary {
    pub kind: String,
    pub weight: f64,
}

pub struct FittedModel {
    version: String,
    labels: Vec<Category>,
    encoder: TfidfEncoder,
    classifier: Option<EnsembleClassifier>,
}

impl FittedModel {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let raw = std::fs::read(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let bundle: ModelBundle = serde_json::from_slice(&raw)?;
        let model = Self::from_bundle(bundle)?;

        tracing::info!(
            path = %path.display(),
            version = %model.version,
            labels = model.labels.len(),
            vocabulary = model.encoder.vocabulary_size().unwrap_or(0),
            classifier = model.classifier.is_some(),
            "Model bundle loaded"
        );
        Ok(model)
    }

    pub fn from_bundle(bundle: ModelBundle) -> Result<Self, ModelLoadError> {
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(ModelLoadError::FormatVersion {
                found: bundle.format_version,
                expected: BUNDLE_FORMAT_VERSION,
            });
        }
        if bundle.labels.is_empty() {
            return Err(ModelLoadError::Invalid("bundle has no labels".into()));
        }

        let encoder = match bundle.encoder {
            Some(params) => TfidfEncoder::from_params(params)?,
            None => TfidfEncoder::unloaded(),
        };
        let classifier = bundle
            .classifier
            .map(|params| EnsembleClassifier::new(bundle.labels.clone(), params))
            .transpose()?;

        if let (Some(vocabulary), Some(classifier)) = (encoder.vocabulary_size(), &classifier) {
            if vocabulary != classifier.n_features() {
                return Err(ModelLoadError::DimensionMismatch {
                    encoder: vocabulary,
                    classifier: classifier.n_features(),
                });
            }
        }

        Ok(Self {
            version: bundle.version,
            labels: bundle.labels,
            encoder,
            classifier,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            version: self.version.clone(),
            format_version: BUNDLE_FORMAT_VERSION,
            labels: self.labels.clone(),
            vocabulary_size: self.encoder.vocabulary_size(),
            ngram_range: self.encoder.ngram_range(),
            base_models: self
                .classifier
                .iter()
                .flat_map(|c| c.members())
                .map(|(kind, weight)| BaseModelSummary {
                    kind: kind.to_string(),
                    weight,
                })
                .collect(),
            calibrated: self.classifier.as_ref().is_some_and(|c| c.is_calibrated()),
        }
    }
}

impl DocumentModel for FittedModel {
    fn labels(&self) -> &[Category] {
        &self.labels
    }

    fn vectorize(&self, text: &str) -> Result<FeatureVector, EncodeError> {
        self.encoder.vectorize(text)
    }

    fn predict(&self, features: &FeatureVector) -> Result<ClassificationResult, ClassifyError> {
        self.classifier
            .as_ref()
            .ok_or(ClassifyError::ClassifierNotLoaded)?
            .predict(features)
    }
}

/// Every label the model can predict must be a configured category.
pub fn ensure_labels_configured(
    model: &dyn DocumentModel,
    categories: &[Category],
) -> Result<(), ConfigError> {
    match model.labels().iter().find(|l| !categories.contains(l)) {
        Some(label) => Err(ConfigError::Model(format!(
            "model label {label} is not a configured category"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_bundle;

    fn write_bundle(dir: &Path, bundle: &serde_json::Value) -> PathBuf {
        let path = dir.join("classifier.json");
        std::fs::write(&path, serde_json::to_vec(bundle).unwrap()).unwrap();
        path
    }

    #[test]
    fn load_and_classify() {
        let dir = tempfile::tempdir().unwrap();
        let model = FittedModel::load(&write_bundle(dir.path(), &sample_bundle())).unwrap();

        let features = model.vectorize("Le présent contrat de bail est conclu").unwrap();
        let result = model.predict(&features).unwrap();
        assert_eq!(result.category, Category::Contract);
        assert!(result.confidence > 0.75);

        let result = model
            .predict(&model.vectorize("Facture: montant total").unwrap())
            .unwrap();
        assert_eq!(result.category, Category::Invoice);
    }

    #[test]
    fn french_labels_load_as_categories() {
        let model = FittedModel::from_bundle(serde_json::from_value(sample_bundle()).unwrap()).unwrap();
        assert_eq!(model.labels(), Category::ALL);
    }

    #[test]
    fn unknown_label_is_fatal() {
        let mut bundle = sample_bundle();
        bundle["labels"][3] = "memo".into();
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FittedModel::load(&write_bundle(dir.path(), &bundle)),
            Err(ModelLoadError::Parse(_))
        ));
    }

    #[test]
    fn wrong_format_version_is_fatal() {
        let mut bundle = sample_bundle();
        bundle["format_version"] = 7.into();
        assert!(matches!(
            FittedModel::from_bundle(serde_json::from_value(bundle).unwrap()),
            Err(ModelLoadError::FormatVersion { found: 7, .. })
        ));
    }

    #[test]
    fn encoder_classifier_dimension_disagreement_is_fatal() {
        let mut bundle = sample_bundle();
        bundle["encoder"]["vocabulary"]["extra"] = 8.into();
        bundle["encoder"]["idf"].as_array_mut().unwrap().push(1.0.into());
        let err = FittedModel::from_bundle(serde_json::from_value(bundle).unwrap())
            .err()
            .unwrap();
        assert!(matches!(
            err,
            ModelLoadError::DimensionMismatch {
                encoder: 9,
                classifier: 8
            }
        ));
        assert!(ConfigError::from(err).to_string().starts_with("Model error"));
    }

    #[test]
    fn missing_parts_fail_per_call() {
        let mut bundle = sample_bundle();
        bundle["classifier"] = serde_json::Value::Null;
        let model = FittedModel::from_bundle(serde_json::from_value(bundle).unwrap()).unwrap();
        let features = model.vectorize("contrat").unwrap();
        assert_eq!(model.predict(&features), Err(ClassifyError::ClassifierNotLoaded));

        let mut bundle = sample_bundle();
        bundle.as_object_mut().unwrap().remove("encoder");
        let model = FittedModel::from_bundle(serde_json::from_value(bundle).unwrap()).unwrap();
        assert_eq!(model.vectorize("contrat"), Err(EncodeError::EncoderNotLoaded));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            FittedModel::load(&dir.path().join("absent.json")),
            Err(ModelLoadError::Io { .. })
        ));
    }

    #[test]
    fn summary_lists_parts() {
        let model = FittedModel::from_bundle(serde_json::from_value(sample_bundle()).unwrap()).unwrap();
        let summary = model.summary();
        assert_eq!(summary.version, "test-1");
        assert_eq!(summary.vocabulary_size, Some(8));
        assert_eq!(summary.ngram_range, Some((1, 1)));
        assert_eq!(
            summary.base_models,
            vec![
                BaseModelSummary {
                    kind: "naive_bayes".into(),
                    weight: 2.0
                },
                BaseModelSummary {
                    kind: "random_forest".into(),
                    weight: 0.5
                },
            ]
        );
        assert!(!summary.calibrated);
    }

    #[test]
    fn labels_must_be_configured() {
        let model = FittedModel::from_bundle(serde_json::from_value(sample_bundle()).unwrap()).unwrap();
        assert!(ensure_labels_configured(&model, Category::ALL).is_ok());
        assert!(matches!(
            ensure_labels_configured(&model, &[Category::Contract, Category::Invoice]),
            Err(ConfigError::Model(_))
        ));
    }
}
