//! CART (Classification and Regression Tree) builder
//!
//! Implements deterministic exact-greedy classification tree construction
//! with Gini impurity. Split scores are compared as exact integer
//! fractions, so the same rows always grow the same tree.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::deterministic::SplitTieBreaker;
use crate::errors::TrainerError;
use crate::learner::Learner;
use crate::model::{DecisionTree, Node};

/// Training parameters for a single tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeParams {
    /// Unlimited when `None`
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl TreeParams {
    pub fn validate(&self) -> Result<(), TrainerError> {
        if self.min_samples_split < 2 {
            return Err(TrainerError::Training(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf < 1 {
            return Err(TrainerError::Training(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Sum over children of `Σ_k count_k² / n_child`, kept as a fraction.
///
/// Weighted Gini impurity is `1 - score / n_parent`, so a higher score is
/// a purer split.
#[derive(Debug, Clone, Copy)]
struct Purity {
    num: u128,
    den: u128,
}

impl Purity {
    fn of(left: [u64; 2], right: [u64; 2]) -> Self {
        let sq = |c: [u64; 2]| (c[0] as u128).pow(2) + (c[1] as u128).pow(2);
        let n_left = (left[0] + left[1]) as u128;
        let n_right = (right[0] + right[1]) as u128;
        Self {
            num: sq(left) * n_right + sq(right) * n_left,
            den: n_left * n_right,
        }
    }

    fn cmp_purity(&self, other: &Self) -> Ordering {
        (self.num * other.den).cmp(&(other.num * self.den))
    }
}

/// Split candidate with score and tie-breaker
#[derive(Debug, Clone)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: u64,
    purity: Purity,
    tie_breaker: SplitTieBreaker,
}

impl SplitCandidate {
    fn new(feature_idx: usize, threshold: u64, purity: Purity) -> Self {
        Self {
            feature_idx,
            threshold,
            purity,
            tie_breaker: SplitTieBreaker::new(feature_idx, threshold),
        }
    }

    fn beats(&self, other: &Self) -> bool {
        match self.purity.cmp_purity(&other.purity) {
            Ordering::Greater => true,
            Ordering::Equal => self.tie_breaker < other.tie_breaker,
            Ordering::Less => false,
        }
    }
}

/// Build a classification tree using the exact-greedy CART algorithm
pub struct CartBuilder<'a> {
    params: TreeParams,
    features: &'a [Vec<u64>],
    classes: &'a [u8],
    feature_count: usize,
}

impl<'a> CartBuilder<'a> {
    pub fn new(
        features: &'a [Vec<u64>],
        classes: &'a [u8],
        params: TreeParams,
    ) -> Result<Self, TrainerError> {
        if features.len() != classes.len() {
            return Err(TrainerError::Training(format!(
                "{} feature rows but {} labels",
                features.len(),
                classes.len()
            )));
        }
        if features.is_empty() {
            return Err(TrainerError::EmptyDataset);
        }

        let feature_count = features[0].len();
        if let Some(row) = features.iter().position(|f| f.len() != feature_count) {
            return Err(TrainerError::Training(format!(
                "row {row} has {} features, expected {feature_count}",
                features[row].len()
            )));
        }
        if let Some(row) = classes.iter().position(|&c| c > 1) {
            return Err(TrainerError::Training(format!(
                "row {row} has class {}, expected 0 or 1",
                classes[row]
            )));
        }

        Ok(Self {
            params,
            features,
            classes,
            feature_count,
        })
    }

    /// Build tree and return it
    pub fn build(&self) -> DecisionTree {
        let mut nodes = Vec::new();
        let indices: Vec<usize> = (0..self.features.len()).collect();

        self.build_node(&indices, 0, &mut nodes);

        DecisionTree::new(self.feature_count, nodes)
    }

    /// Recursively build tree nodes in pre-order
    fn build_node(&self, indices: &[usize], depth: usize, nodes: &mut Vec<Node>) -> i32 {
        let current_idx = nodes.len() as i32;
        let counts = self.class_counts(indices);
        // ties go to class 0
        let majority = u8::from(counts[1] > counts[0]);

        let pure = counts[0] == 0 || counts[1] == 0;
        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if pure
            || depth_reached
            || indices.len() < self.params.min_samples_split
            || indices.len() < 2 * self.params.min_samples_leaf
        {
            nodes.push(Node::leaf(current_idx, majority, counts));
            return current_idx;
        }

        let split = match self.find_best_split(indices) {
            Some(s) => s,
            None => {
                nodes.push(Node::leaf(current_idx, majority, counts));
                return current_idx;
            }
        };

        let (left_indices, right_indices) =
            self.split_samples(indices, split.feature_idx, split.threshold);

        // Reserve space for current node
        nodes.push(Node::internal(
            current_idx,
            split.feature_idx as i32,
            split.threshold,
            -1,
            -1,
            counts,
        ));

        let left_idx = self.build_node(&left_indices, depth + 1, nodes);
        let right_idx = self.build_node(&right_indices, depth + 1, nodes);

        nodes[current_idx as usize].left = left_idx;
        nodes[current_idx as usize].right = right_idx;

        current_idx
    }

    /// Scan every feature, sorted by value, for the purest admissible split
    fn find_best_split(&self, indices: &[usize]) -> Option<SplitCandidate> {
        let total = self.class_counts(indices);
        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;

        for feature_idx in 0..self.feature_count {
            let mut sorted: Vec<(u64, u8)> = indices
                .iter()
                .map(|&i| (self.features[i][feature_idx], self.classes[i]))
                .collect();
            sorted.sort_unstable();

            let mut left = [0u64; 2];
            for pos in 0..sorted.len() - 1 {
                let (value, class) = sorted[pos];
                left[class as usize] += 1;

                let next = sorted[pos + 1].0;
                if next == value {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = sorted.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right = [total[0] - left[0], total[1] - left[1]];
                let threshold = value + (next - value) / 2;
                let candidate = SplitCandidate::new(feature_idx, threshold, Purity::of(left, right));

                if best.as_ref().map_or(true, |current| candidate.beats(current)) {
                    best = Some(candidate);
                }
            }
        }

        best
    }

    /// Split samples based on threshold
    fn split_samples(
        &self,
        indices: &[usize],
        feature_idx: usize,
        threshold: u64,
    ) -> (Vec<usize>, Vec<usize>) {
        indices
            .iter()
            .partition(|&&idx| self.features[idx][feature_idx] <= threshold)
    }

    fn class_counts(&self, indices: &[usize]) -> [u64; 2] {
        let mut counts = [0u64; 2];
        for &idx in indices {
            counts[self.classes[idx] as usize] += 1;
        }
        counts
    }
}

/// Single-tree CART learner
#[derive(Debug, Clone, Default)]
pub struct CartLearner {
    pub params: TreeParams,
}

impl CartLearner {
    pub fn new(params: TreeParams) -> Self {
        Self { params }
    }
}

impl Learner for CartLearner {
    type Model = DecisionTree;

    fn fit(&self, features: &[Vec<u64>], classes: &[u8]) -> Result<DecisionTree, TrainerError> {
        self.params.validate()?;
        let tree = CartBuilder::new(features, classes, self.params.clone())?.build();
        tree.validate().map_err(TrainerError::Training)?;
        Ok(tree)
    }
}
