//! Delphi Trainer - deterministic malware classifier training
//!
//! Partitions a mined dataset with a seeded permutation, encodes labels,
//! fits a CART decision tree and persists it as a canonical JSON blob that
//! the predictor loads verbatim.

pub mod cart;
pub mod deterministic;
pub mod encoding;
pub mod errors;
pub mod learner;
pub mod model;
pub mod predictor;
pub mod serialization;
pub mod trainer;

use delphi_features::Dataset;

pub use cart::{CartBuilder, CartLearner, TreeParams};
pub use deterministic::{train_test_split, LcgRng, Partition, SplitTieBreaker};
pub use encoding::LabelEncoding;
pub use errors::{ModelLoadError, TrainerError};
pub use learner::{Classifier, Learner};
pub use model::{DecisionTree, Node, MODEL_EXTENSION};
pub use predictor::Predictor;
pub use trainer::{Trainer, TrainingOutcome, TrainingParams};

/// Train the default decision tree on `dataset`
pub fn train(dataset: &Dataset, params: TrainingParams) -> Result<TrainingOutcome<DecisionTree>, TrainerError> {
    Trainer::new(params).train(dataset)
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
