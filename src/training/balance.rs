//! Class balancing and stratified hold-out splitting

use crate::error::{InspectError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row indices grouped by class label, ascending by label
pub fn class_indices(y: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices.entry(label.round() as i64).or_default().push(i);
    }
    indices
}

pub fn class_counts(y: &Array1<f64>) -> BTreeMap<i64, usize> {
    class_indices(y)
        .into_iter()
        .map(|(label, idx)| (label, idx.len()))
        .collect()
}

/// A resampling strategy that selects a subset of rows
pub trait Sampler: Send + Sync {
    /// Indices of the rows to keep, ascending
    fn sample_indices(&self, y: &Array1<f64>) -> Result<Vec<usize>>;

    fn resample(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
        if x.nrows() != y.len() {
            return Err(InspectError::ShapeError(format!(
                "features have {} rows but labels have {}",
                x.nrows(),
                y.len()
            )));
        }
        let keep = self.sample_indices(y)?;
        Ok((x.select(Axis(0), &keep), y.select(Axis(0), &keep)))
    }
}

/// Random undersampler: every class is cut down to the minority count
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomUnderSampler {
    seed: Option<u64>,
}

impl RandomUnderSampler {
    pub fn new() -> Self {
        Self { seed: Some(42) }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl Default for RandomUnderSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for RandomUnderSampler {
    fn sample_indices(&self, y: &Array1<f64>) -> Result<Vec<usize>> {
        let indices = class_indices(y);
        let min_count = match indices.values().map(Vec::len).min() {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        let mut rng = match self.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let mut selected = Vec::new();
        for class_idx in indices.values() {
            let mut shuffled = class_idx.clone();
            shuffled.shuffle(&mut rng);
            selected.extend(shuffled.into_iter().take(min_count));
        }

        selected.sort_unstable();
        Ok(selected)
    }
}

/// Fit and held-out row indices, each ascending
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub fit: Vec<usize>,
    pub held_out: Vec<usize>,
}

/// Holds out `ceil(n * test_size)` shuffled rows in total, apportioned to
/// the classes by their share (largest remainder, ties to the lower label)
pub fn stratified_split(y: &Array1<f64>, test_size: f64, seed: u64) -> SplitIndices {
    let test_size = test_size.clamp(0.0, 1.0);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let classes: Vec<Vec<usize>> = class_indices(y).into_values().collect();
    let n = y.len();
    let n_test = ((n as f64) * test_size).ceil() as usize;

    let mut quotas: Vec<usize> = Vec::with_capacity(classes.len());
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(classes.len());
    for (c, idx) in classes.iter().enumerate() {
        let exact = if n > 0 { idx.len() as f64 * n_test as f64 / n as f64 } else { 0.0 };
        quotas.push(exact.floor() as usize);
        remainders.push((c, exact - exact.floor()));
    }
    let leftover = n_test.saturating_sub(quotas.iter().sum());
    remainders.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    for &(c, _) in remainders.iter().take(leftover) {
        quotas[c] += 1;
    }

    let mut fit = Vec::new();
    let mut held_out = Vec::new();

    for (mut idx, quota) in classes.into_iter().zip(quotas) {
        idx.shuffle(&mut rng);
        let n_held = quota.min(idx.len());
        held_out.extend_from_slice(&idx[..n_held]);
        fit.extend_from_slice(&idx[n_held..]);
    }

    fit.sort_unstable();
    held_out.sort_unstable();
    SplitIndices { fit, held_out }
}
