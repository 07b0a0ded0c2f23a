//! Deterministic utilities for reproducible training
//!
//! Provides the LCG-based RNG behind the seeded train/test partition and
//! the tie-breaking order used when two splits score the same.

use std::num::Wrapping;

use crate::errors::TrainerError;

/// Linear Congruential Generator for deterministic pseudo-randomness
/// Uses constants from Numerical Recipes (glibc)
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<i64>,
}

impl LcgRng {
    // LCG constants (compatible with glibc)
    const MULTIPLIER: i64 = 1103515245;
    const INCREMENT: i64 = 12345;
    const MODULUS: i64 = 1 << 31;

    pub fn new(seed: u64) -> Self {
        Self {
            state: Wrapping((seed % Self::MODULUS as u64) as i64),
        }
    }

    /// Generate next random i64 in range [0, MODULUS)
    pub fn next_i64(&mut self) -> i64 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        self.state.0 & (Self::MODULUS - 1)
    }

    /// Generate random index in range [0, max)
    pub fn next_index(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next_i64() as u64 % max as u64) as usize
    }

    /// Fisher-Yates shuffle driven by this generator
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_index(i + 1);
            items.swap(i, j);
        }
    }
}

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.train.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of held-out rows for `n` rows at fraction `test_size`
///
/// Rounds up, and always leaves at least one row on each side.
pub fn test_count(n: usize, test_size: f64) -> Result<usize, TrainerError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(TrainerError::InvalidSplit(format!(
            "test_size must lie strictly between 0 and 1, got {test_size}"
        )));
    }

    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainerError::InvalidSplit(format!(
            "{n} rows at test_size {test_size} leave {n_test} test and {} train rows",
            n.saturating_sub(n_test)
        )));
    }

    Ok(n_test)
}

/// Seeded partition of `0..n` into train and test indices
///
/// The same `(n, test_size, seed)` always yields the same membership.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<Partition, TrainerError> {
    let n_test = test_count(n, test_size)?;

    let mut order: Vec<usize> = (0..n).collect();
    LcgRng::new(seed).shuffle(&mut order);

    let train = order.split_off(n_test);
    Ok(Partition { train, test: order })
}

/// Deterministic tie-breaker for split selection
/// Lower `(feature_idx, threshold)` wins among equally scored splits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: u64,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: u64) -> Self {
        Self {
            feature_idx,
            threshold,
        }
    }
}
