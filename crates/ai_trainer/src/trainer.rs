//! Decision tree trainer
//!
//! Turns a mined dataset into a fitted classifier: validates every row,
//! encodes labels, partitions rows with a seeded permutation and fits the
//! learner on the training portion only. The held-out portion is scored
//! for the log and otherwise left alone.

use delphi_features::{Dataset, DatasetRow, FEATURE_COLUMNS};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cart::{CartLearner, TreeParams};
use crate::deterministic::{train_test_split, Partition};
use crate::encoding::LabelEncoding;
use crate::errors::TrainerError;
use crate::learner::{Classifier, Learner};

/// Trainer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingParams {
    /// Fraction of rows held out, in (0, 1)
    pub test_size: f64,
    pub seed: u64,
    pub tree: TreeParams,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            tree: TreeParams::default(),
        }
    }
}

/// Result of one training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome<M> {
    pub model: M,
    /// Dataset row positions used for fitting and for holdout
    pub partition: Partition,
    /// Fraction of held-out rows classified correctly
    pub holdout_accuracy: f64,
}

impl<M> TrainingOutcome<M> {
    pub fn train_rows(&self) -> usize {
        self.partition.train.len()
    }

    pub fn test_rows(&self) -> usize {
        self.partition.test.len()
    }
}

/// Fits a learner on a seeded partition of a dataset
pub struct Trainer<L = CartLearner> {
    params: TrainingParams,
    learner: L,
}

impl Trainer<CartLearner> {
    pub fn new(params: TrainingParams) -> Self {
        let learner = CartLearner::new(params.tree.clone());
        Self { params, learner }
    }
}

impl<L: Learner> Trainer<L> {
    pub fn with_learner(params: TrainingParams, learner: L) -> Self {
        Self { params, learner }
    }

    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    /// Train on `dataset`
    ///
    /// Every row must carry a known label and all feature cells; nothing is
    /// fitted otherwise.
    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome<L::Model>, TrainerError> {
        if dataset.is_empty() {
            return Err(TrainerError::EmptyDataset);
        }

        let (features, classes) = encode_rows(dataset)?;
        let partition = train_test_split(dataset.len(), self.params.test_size, self.params.seed)?;

        let (train_x, train_y) = select(&features, &classes, &partition.train);
        let (test_x, test_y) = select(&features, &classes, &partition.test);

        info!(
            "Training on {} rows, holding out {} (test_size {}, seed {})",
            train_x.len(),
            test_x.len(),
            self.params.test_size,
            self.params.seed
        );

        let model = self.learner.fit(&train_x, &train_y)?;

        let predicted = model.predict_classes(&test_x);
        let correct = predicted
            .iter()
            .zip(test_y.iter())
            .filter(|(p, y)| p == y)
            .count();
        let holdout_accuracy = correct as f64 / test_y.len() as f64;
        info!(
            "Holdout accuracy {:.4} ({}/{})",
            holdout_accuracy,
            correct,
            test_y.len()
        );

        Ok(TrainingOutcome {
            model,
            partition,
            holdout_accuracy,
        })
    }
}

/// Feature matrix and class vector for every row of `dataset`
pub fn encode_rows(dataset: &Dataset) -> Result<(Vec<Vec<u64>>, Vec<u8>), TrainerError> {
    let encoding = LabelEncoding;
    let mut features = Vec::with_capacity(dataset.len());
    let mut classes = Vec::with_capacity(dataset.len());

    for (row, entry) in dataset.iter().enumerate() {
        classes.push(encoding.encode_text(row, &entry.label)?);
        features.push(complete_features(row, entry)?);
    }

    Ok((features, classes))
}

/// Feature matrix for every row of `dataset`; labels are not read
pub fn feature_matrix(dataset: &Dataset) -> Result<Vec<Vec<u64>>, TrainerError> {
    dataset
        .iter()
        .enumerate()
        .map(|(row, entry)| complete_features(row, entry))
        .collect()
}

fn complete_features(row: usize, entry: &DatasetRow) -> Result<Vec<u64>, TrainerError> {
    entry
        .feature_vector()
        .ok_or_else(|| TrainerError::IncompleteRow {
            row,
            column: missing_column(&entry.values),
        })
}

fn missing_column(values: &[Option<u64>]) -> &'static str {
    values
        .iter()
        .position(Option::is_none)
        .map_or("?", |i| FEATURE_COLUMNS[i])
}

fn select(features: &[Vec<u64>], classes: &[u8], rows: &[usize]) -> (Vec<Vec<u64>>, Vec<u8>) {
    rows.iter()
        .map(|&i| (features[i].clone(), classes[i]))
        .unzip()
}
