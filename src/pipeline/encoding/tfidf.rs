use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::tokenizer::{ngrams, tokenize, FRENCH_STOP_WORDS};
use super::{EncodeError, FeatureVector};
use crate::pipeline::model::ModelLoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L2,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopWords {
    None,
    #[default]
    French,
    List(Vec<String>),
}

/// Fitted TF-IDF state as stored in the model bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfParams {
    /// Term → column index. Indices cover `0..idf.len()` exactly once.
    pub vocabulary: BTreeMap<String, usize>,
    pub idf: Vec<f64>,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    /// Use `1 + ln(tf)` instead of the raw count.
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
    #[serde(default)]
    pub stop_words: StopWords,
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

impl TfidfParams {
    pub fn validate(&self) -> Result<(), ModelLoadError> {
        let size = self.idf.len();
        if self.vocabulary.len() != size {
            return Err(ModelLoadError::Invalid(format!(
                "vocabulary has {} terms but idf has {} weights",
                self.vocabulary.len(),
                size
            )));
        }

        let mut seen = vec![false; size];
        for (term, &index) in &self.vocabulary {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                Some(_) => {
                    return Err(ModelLoadError::Invalid(format!(
                        "vocabulary index {index} is used twice (term {term:?})"
                    )))
                }
                None => {
                    return Err(ModelLoadError::Invalid(format!(
                        "vocabulary index {index} out of range for term {term:?}"
                    )))
                }
            }
        }

        if self.idf.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ModelLoadError::Invalid("idf weights must be finite and >= 0".into()));
        }

        let (min_n, max_n) = self.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(ModelLoadError::Invalid(format!(
                "invalid ngram_range ({min_n}, {max_n})"
            )));
        }
        Ok(())
    }
}

/// Turns document text into a fixed-length TF-IDF vector.
pub struct TfidfEncoder {
    params: Option<TfidfParams>,
    stop_words: HashSet<String>,
}

impl TfidfEncoder {
    /// Encoder with no fitted state; every `vectorize` call fails.
    pub fn unloaded() -> Self {
        Self {
            params: None,
            stop_words: HashSet::new(),
        }
    }

    pub fn from_params(params: TfidfParams) -> Result<Self, ModelLoadError> {
        params.validate()?;
        let stop_words = match &params.stop_words {
            StopWords::None => HashSet::new(),
            StopWords::French => FRENCH_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            StopWords::List(words) => words.iter().map(|w| w.to_lowercase()).collect(),
        };
        Ok(Self {
            params: Some(params),
            stop_words,
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.params.is_some()
    }

    pub fn vocabulary_size(&self) -> Option<usize> {
        self.params.as_ref().map(|p| p.idf.len())
    }

    pub fn ngram_range(&self) -> Option<(usize, usize)> {
        self.params.as_ref().map(|p| p.ngram_range)
    }

    pub fn vectorize(&self, text: &str) -> Result<FeatureVector, EncodeError> {
        let params = self.params.as_ref().ok_or(EncodeError::EncoderNotLoaded)?;

        let tokens = tokenize(text, |t| self.stop_words.contains(t));
        let mut values = vec![0.0f64; params.idf.len()];
        for term in ngrams(&tokens, params.ngram_range) {
            if let Some(&index) = params.vocabulary.get(&term) {
                values[index] += 1.0;
            }
        }

        for (value, idf) in values.iter_mut().zip(&params.idf) {
            if *value > 0.0 {
                if params.sublinear_tf {
                    *value = 1.0 + value.ln();
                }
                *value *= idf;
            }
        }

        if params.norm == Some(Norm::L2) {
            let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm > 0.0 {
                values.iter_mut().for_each(|v| *v /= norm);
            }
        }

        let vector = FeatureVector::new(values);
        tracing::debug!(
            tokens = tokens.len(),
            nonzero = vector.nnz(),
            dims = vector.len(),
            "Text vectorized"
        );
        Ok(vector)
    }
}
