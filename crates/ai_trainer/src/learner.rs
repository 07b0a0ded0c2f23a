//! Learner seam
//!
//! The trainer only needs something that fits encoded rows and something
//! that predicts a class for one feature vector.

use crate::errors::TrainerError;

/// A fitted binary classifier over integer feature vectors
pub trait Classifier {
    /// Predicted class id for one feature vector
    fn predict_class(&self, features: &[u64]) -> u8;

    fn predict_classes(&self, rows: &[Vec<u64>]) -> Vec<u8> {
        rows.iter().map(|row| self.predict_class(row)).collect()
    }
}

/// Produces a classifier from encoded training rows
pub trait Learner {
    type Model: Classifier;

    fn fit(&self, features: &[Vec<u64>], classes: &[u8]) -> Result<Self::Model, TrainerError>;
}
