//! Second-order gradient-boosted trees for binary classification
//!
//! Each round fits a regression tree to the gradient and hessian of the
//! logistic loss:
//! - leaf weight: w* = -G / (H + lambda), with L1 soft-thresholding by alpha
//! - split gain: 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)]
//! - a split is kept only when gain exceeds gamma and both children carry at
//!   least `min_child_weight` hessian mass

use crate::error::{InspectError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const PROBA_EPS: f64 = 1e-15;

/// Booster hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: Option<u64>,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 4,
            min_child_weight: 5.0,
            reg_lambda: 1.0,
            reg_alpha: 1.0,
            gamma: 0.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            random_state: Some(42),
        }
    }
}

/// Per-round metrics on the evaluation set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationHistory {
    pub logloss: Vec<f64>,
    pub error: Vec<f64>,
}

impl EvaluationHistory {
    pub fn rounds(&self) -> usize {
        self.logloss.len().max(self.error.len())
    }

    pub fn is_empty(&self) -> bool {
        self.rounds() == 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        match self {
            TreeNode::Leaf { weight } => *weight,
            TreeNode::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    left.predict(sample)
                } else {
                    right.predict(sample)
                }
            }
        }
    }
}

struct GradPair<'a> {
    grad: &'a Array1<f64>,
    hess: &'a Array1<f64>,
}

fn build_tree(
    x: &Array2<f64>,
    gh: &GradPair<'_>,
    indices: &[usize],
    features: &[usize],
    depth: usize,
    config: &BoosterConfig,
) -> TreeNode {
    let g_sum: f64 = indices.iter().map(|&i| gh.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| gh.hess[i]).sum();
    let weight = leaf_weight(g_sum, h_sum, config.reg_lambda, config.reg_alpha);

    if depth >= config.max_depth || indices.len() < 2 || h_sum < config.min_child_weight {
        return TreeNode::Leaf { weight };
    }

    // Ties broken towards the lower feature index so the result does not
    // depend on rayon's scheduling
    let best = features
        .par_iter()
        .filter_map(|&f| best_split_for_feature(x, gh, indices, f, config))
        .max_by(|a, b| {
            a.gain
                .total_cmp(&b.gain)
                .then_with(|| b.feature.cmp(&a.feature))
        });

    match best {
        Some(split) if split.gain > config.gamma => {
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                .iter()
                .partition(|&&i| x[[i, split.feature]] <= split.threshold);

            if left_idx.is_empty() || right_idx.is_empty() {
                return TreeNode::Leaf { weight };
            }

            TreeNode::Split {
                feature: split.feature,
                threshold: split.threshold,
                left: Box::new(build_tree(x, gh, &left_idx, features, depth + 1, config)),
                right: Box::new(build_tree(x, gh, &right_idx, features, depth + 1, config)),
            }
        }
        _ => TreeNode::Leaf { weight },
    }
}

fn leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    let g = if g_sum > alpha {
        g_sum - alpha
    } else if g_sum < -alpha {
        g_sum + alpha
    } else {
        return 0.0;
    };
    -g / (h_sum + lambda)
}

struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Exact greedy scan over the sorted values of one feature
fn best_split_for_feature(
    x: &Array2<f64>,
    gh: &GradPair<'_>,
    indices: &[usize],
    feature: usize,
    config: &BoosterConfig,
) -> Option<Split> {
    let mut sorted = indices.to_vec();
    sorted.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));

    let g_total: f64 = sorted.iter().map(|&i| gh.grad[i]).sum();
    let h_total: f64 = sorted.iter().map(|&i| gh.hess[i]).sum();
    let lambda = config.reg_lambda;
    let parent = g_total * g_total / (h_total + lambda);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<Split> = None;

    for pos in 0..sorted.len().saturating_sub(1) {
        let idx = sorted[pos];
        let next = sorted[pos + 1];
        g_left += gh.grad[idx];
        h_left += gh.hess[idx];

        let (value, next_value) = (x[[idx, feature]], x[[next, feature]]);
        if (next_value - value).abs() < 1e-12 {
            continue;
        }

        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                - parent);

        if best.as_ref().map_or(true, |b| gain > b.gain) {
            best = Some(Split {
                feature,
                threshold: (value + next_value) / 2.0,
                gain,
            });
        }
    }

    best
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Mean logistic loss of probabilities against 0/1 labels
pub fn logloss(y: &Array1<f64>, proba: &Array1<f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let total: f64 = y
        .iter()
        .zip(proba.iter())
        .map(|(&t, &p)| {
            let p = p.clamp(PROBA_EPS, 1.0 - PROBA_EPS);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum();
    total / y.len() as f64
}

/// Fraction of rows whose thresholded probability disagrees with the label
pub fn classification_error(y: &Array1<f64>, proba: &Array1<f64>) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let wrong = y
        .iter()
        .zip(proba.iter())
        .filter(|&(&t, &p)| (p > 0.5) != (t > 0.5))
        .count();
    wrong as f64 / y.len() as f64
}

/// Logistic-loss boosted tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoostedClassifier {
    config: BoosterConfig,
    trees: Vec<TreeNode>,
    base_score: f64,
    n_features: usize,
}

impl BoostedClassifier {
    pub fn new(config: BoosterConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &BoosterConfig {
        &self.config
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_with_eval(x, y, None).map(|_| ())
    }

    /// Fit on `(x, y)`, recording logloss and error on `eval` after every
    /// round. Without an eval set the history is measured on the fit set.
    pub fn fit_with_eval(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        eval: Option<(&Array2<f64>, &Array1<f64>)>,
    ) -> Result<EvaluationHistory> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples == 0 {
            return Err(InspectError::TrainingError("cannot fit on an empty training set".to_string()));
        }
        if y.len() != n_samples {
            return Err(InspectError::ShapeError(format!(
                "features have {} rows but labels have {}",
                n_samples,
                y.len()
            )));
        }
        let (eval_x, eval_y) = eval.unwrap_or((x, y));
        if eval_x.ncols() != n_features || eval_x.nrows() != eval_y.len() {
            return Err(InspectError::ShapeError(format!(
                "evaluation set is {}x{} with {} labels, expected {} columns",
                eval_x.nrows(),
                eval_x.ncols(),
                eval_y.len(),
                n_features
            )));
        }

        self.n_features = n_features;
        self.trees.clear();

        // Base score in log-odds space
        let p = y.mean().unwrap_or(0.5).clamp(1e-7, 1.0 - 1e-7);
        self.base_score = (p / (1.0 - p)).ln();
        let mut raw = Array1::from_elem(n_samples, self.base_score);
        let mut eval_raw = Array1::from_elem(eval_x.nrows(), self.base_score);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let mut history = EvaluationHistory::default();
        let lr = self.config.learning_rate;

        for _ in 0..self.config.n_estimators {
            // grad = p - y, hess = p * (1 - p)
            let probs = raw.mapv(sigmoid);
            let grad: Array1<f64> = &probs - y;
            let hess: Array1<f64> = probs.mapv(|p| (p * (1.0 - p)).max(1e-7));
            let gh = GradPair { grad: &grad, hess: &hess };

            let rows = subsample(&mut rng, n_samples, self.config.subsample);
            let cols = subsample(&mut rng, n_features, self.config.colsample_bytree);

            let tree = build_tree(x, &gh, &rows, &cols, 0, &self.config);

            for (i, row) in x.rows().into_iter().enumerate() {
                raw[i] += lr * tree.predict(row);
            }
            for (i, row) in eval_x.rows().into_iter().enumerate() {
                eval_raw[i] += lr * tree.predict(row);
            }

            let eval_proba = eval_raw.mapv(sigmoid);
            history.logloss.push(logloss(eval_y, &eval_proba));
            history.error.push(classification_error(eval_y, &eval_proba));

            self.trees.push(tree);
        }

        Ok(history)
    }

    /// Probability of the positive class for each row
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features {
            return Err(InspectError::ShapeError(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        let lr = self.config.learning_rate;
        let proba = x
            .rows()
            .into_iter()
            .map(|row| {
                let margin: f64 = self.base_score
                    + self.trees.iter().map(|t| lr * t.predict(row)).sum::<f64>();
                sigmoid(margin)
            })
            .collect();
        Ok(proba)
    }

    /// Class labels (0.0 / 1.0), positive when the probability exceeds 0.5
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
    }
}

fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64) * ratio).ceil().max(1.0) as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(rng);
    indices.truncate(k.min(n));
    indices.sort_unstable();
    indices
}
