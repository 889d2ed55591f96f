//! Model training module
//!
//! - second-order gradient-boosted trees with per-round evaluation
//! - random undersampling and stratified hold-out splits
//! - the range-driven training pipeline

mod balance;
mod booster;
mod trainer;

pub use balance::{class_counts, class_indices, stratified_split, RandomUnderSampler, Sampler, SplitIndices};
pub use booster::{classification_error, logloss, BoostedClassifier, BoosterConfig, EvaluationHistory};
pub use trainer::{Trainer, TrainedModel, TrainingConfig, TrainingOutcome};
