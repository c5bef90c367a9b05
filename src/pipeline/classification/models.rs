use serde::{Deserialize, Serialize};

use super::renormalize;
use crate::pipeline::model::ModelLoadError;

/// A fitted base model that scores one feature vector as a class distribution.
pub trait ProbabilityModel: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Check the fitted parameters against the ensemble's shape.
    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), ModelLoadError>;

    /// One probability per class, summing to 1. `features` has the validated length.
    fn predict_proba(&self, features: &[f64]) -> Vec<f64>;
}

/// The closed set of base models a bundle may contain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BaseModel {
    NaiveBayes(NaiveBayes),
    RandomForest(RandomForest),
    LinearMargin(LinearMargin),
}

impl BaseModel {
    fn inner(&self) -> &dyn ProbabilityModel {
        match self {
            Self::NaiveBayes(m) => m as &dyn ProbabilityModel,
            Self::RandomForest(m) => m as &dyn ProbabilityModel,
            Self::LinearMargin(m) => m as &dyn ProbabilityModel,
        }
    }
}

impl ProbabilityModel for BaseModel {
    fn kind(&self) -> &'static str {
        self.inner().kind()
    }

    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), ModelLoadError> {
        self.inner().validate(n_classes, n_features)
    }

    fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        self.inner().predict_proba(features)
    }
}

fn invalid(kind: &str, detail: impl std::fmt::Display) -> ModelLoadError {
    ModelLoadError::Invalid(format!("{kind}: {detail}"))
}

fn check_rows(
    kind: &str,
    what: &str,
    rows: &[Vec<f64>],
    n_classes: usize,
    n_features: usize,
) -> Result<(), ModelLoadError> {
    if rows.len() != n_classes {
        return Err(invalid(kind, format!("{} {what} rows, expected {n_classes}", rows.len())));
    }
    if let Some(row) = rows.iter().find(|r| r.len() != n_features) {
        return Err(invalid(
            kind,
            format!("{what} row has {} columns, expected {n_features}", row.len()),
        ));
    }
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(invalid(kind, format!("{what} contains non-finite values")));
    }
    Ok(())
}

// ═══════════════════════════════════════════
// Multinomial naive Bayes
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NaiveBayes {
    pub class_log_prior: Vec<f64>,
    /// `[class][feature]` log probability of the feature given the class.
    pub feature_log_prob: Vec<Vec<f64>>,
}

impl ProbabilityModel for NaiveBayes {
    fn kind(&self) -> &'static str {
        "naive_bayes"
    }

    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), ModelLoadError> {
        if self.class_log_prior.len() != n_classes
            || self.class_log_prior.iter().any(|v| !v.is_finite())
        {
            return Err(invalid(self.kind(), "class_log_prior does not match the labels"));
        }
        check_rows(self.kind(), "feature_log_prob", &self.feature_log_prob, n_classes, n_features)
    }

    fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let joint: Vec<f64> = self
            .class_log_prior
            .iter()
            .zip(&self.feature_log_prob)
            .map(|(prior, log_probs)| {
                prior + features.iter().zip(log_probs).map(|(x, lp)| x * lp).sum::<f64>()
            })
            .collect();

        // log-sum-exp keeps long documents from underflowing
        let max = joint.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut probs: Vec<f64> = joint.iter().map(|j| (j - max).exp()).collect();
        renormalize(&mut probs);
        probs
    }
}

// ═══════════════════════════════════════════
// Random forest
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left when `features[feature] <= threshold`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Class counts or weights at the leaf; normalized on use.
    Leaf { value: Vec<f64> },
}

/// Nodes stored flat; node 0 is the root and children always follow their parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("empty tree".into());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {i} splits on feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {i} has a non-finite threshold"));
                    }
                    let in_order = |child: usize| child > i && child < self.nodes.len();
                    if !in_order(*left) || !in_order(*right) {
                        return Err(format!("node {i} has children out of order"));
                    }
                }
                TreeNode::Leaf { value } => {
                    if value.len() != n_classes {
                        return Err(format!("leaf {i} has {} classes", value.len()));
                    }
                    if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                        return Err(format!("leaf {i} has negative or non-finite weights"));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_distribution(&self, features: &[f64]) -> Vec<f64> {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { value } => {
                    let mut probs = value.clone();
                    renormalize(&mut probs);
                    return probs;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub trees: Vec<DecisionTree>,
}

impl ProbabilityModel for RandomForest {
    fn kind(&self) -> &'static str {
        "random_forest"
    }

    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), ModelLoadError> {
        if self.trees.is_empty() {
            return Err(invalid(self.kind(), "no trees"));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(n_classes, n_features)
                .map_err(|e| invalid(self.kind(), format!("tree {i}: {e}")))?;
        }
        Ok(())
    }

    fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let mut sum: Vec<f64> = Vec::new();
        for tree in &self.trees {
            let leaf = tree.leaf_distribution(features);
            if sum.is_empty() {
                sum = vec![0.0; leaf.len()];
            }
            sum.iter_mut().zip(&leaf).for_each(|(s, p)| *s += p);
        }
        renormalize(&mut sum);
        sum
    }
}

// ═══════════════════════════════════════════
// Linear margin model (one-vs-rest + Platt scaling)
// ═══════════════════════════════════════════

/// `P(class | d) = 1 / (1 + exp(a * d + b))` for decision value `d`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlattScaling {
    pub a: f64,
    pub b: f64,
}

impl PlattScaling {
    fn probability(&self, decision: f64) -> f64 {
        1.0 / (1.0 + (self.a * decision + self.b).exp())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearMargin {
    /// `[class][feature]` one-vs-rest weights.
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
    pub platt: Vec<PlattScaling>,
}

impl ProbabilityModel for LinearMargin {
    fn kind(&self) -> &'static str {
        "linear_margin"
    }

    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), ModelLoadError> {
        check_rows(self.kind(), "coef", &self.coef, n_classes, n_features)?;
        if self.intercept.len() != n_classes || self.platt.len() != n_classes {
            return Err(invalid(
                self.kind(),
                format!(
                    "{} intercepts and {} sigmoids for {n_classes} classes",
                    self.intercept.len(),
                    self.platt.len()
                ),
            ));
        }
        let finite = self.intercept.iter().all(|v| v.is_finite())
            && self.platt.iter().all(|s| s.a.is_finite() && s.b.is_finite());
        if !finite {
            return Err(invalid(self.kind(), "non-finite intercept or sigmoid"));
        }
        Ok(())
    }

    fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let mut probs: Vec<f64> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .zip(&self.platt)
            .map(|((weights, bias), sigmoid)| {
                let decision =
                    bias + weights.iter().zip(features).map(|(w, x)| w * x).sum::<f64>();
                sigmoid.probability(decision)
            })
            .collect();
        renormalize(&mut probs);
        probs
    }
}
