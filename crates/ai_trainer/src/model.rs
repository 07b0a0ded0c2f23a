//! Decision tree model and its on-disk form
//!
//! A model is a flat vector of nodes, node 0 being the root. Internal nodes
//! send a row left when `features[feature_idx] <= threshold`. Leaves carry
//! the majority class and the per-class training counts that reached them.
//!
//! On disk the model is canonical JSON with a `.json` suffix, next to a
//! `<stem>.hash` file holding the BLAKE3 digest of those bytes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::encoding::LabelEncoding;
use crate::errors::ModelLoadError;
use crate::learner::Classifier;
use crate::serialization::{hash_canonical_hex, to_canonical_json};

/// Required model file suffix
pub const MODEL_EXTENSION: &str = "json";

/// Suffix of the digest file written next to a model
pub const HASH_EXTENSION: &str = "hash";

/// A decision tree node (internal or leaf)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Node {
    pub id: i32,

    /// Left child index (-1 for leaves)
    pub left: i32,

    /// Right child index (-1 for leaves)
    pub right: i32,

    /// Feature index to split on (-1 for leaves)
    pub feature_idx: i32,

    pub threshold: u64,

    /// Training rows per class (benign, malware) that reached this node
    pub counts: [u64; 2],

    /// Predicted class for leaves
    pub leaf: Option<u8>,
}

impl Node {
    pub fn internal(
        id: i32,
        feature_idx: i32,
        threshold: u64,
        left: i32,
        right: i32,
        counts: [u64; 2],
    ) -> Self {
        Self {
            id,
            left,
            right,
            feature_idx,
            threshold,
            counts,
            leaf: None,
        }
    }

    pub fn leaf(id: i32, class: u8, counts: [u64; 2]) -> Self {
        Self {
            id,
            left: -1,
            right: -1,
            feature_idx: -1,
            threshold: 0,
            counts,
            leaf: Some(class),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.feature_idx == -1 || self.leaf.is_some()
    }
}

/// A fitted binary classification tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DecisionTree {
    /// Width of the feature vectors the tree was fitted on
    pub feature_count: usize,

    /// Tree nodes (node 0 is the root)
    pub nodes: Vec<Node>,
}

impl DecisionTree {
    pub fn new(feature_count: usize, nodes: Vec<Node>) -> Self {
        Self {
            feature_count,
            nodes,
        }
    }

    /// Leaf reached by `features`, if the structure allows reaching one
    fn leaf_for(&self, features: &[u64]) -> Option<&Node> {
        let mut idx = 0usize;
        // a valid tree never revisits a node
        for _ in 0..self.nodes.len() {
            let node = self.nodes.get(idx)?;
            if node.is_leaf() {
                return Some(node);
            }

            let value = *features.get(node.feature_idx as usize)?;
            let next = if value <= node.threshold {
                node.left
            } else {
                node.right
            };
            idx = usize::try_from(next).ok()?;
        }
        None
    }

    /// Whether `features` has the width the tree was fitted on
    pub fn accepts(&self, features: &[u64]) -> bool {
        features.len() == self.feature_count
    }

    /// Fraction of training rows labeled malware in the reached leaf
    pub fn malware_probability(&self, features: &[u64]) -> f64 {
        match self.leaf_for(features) {
            Some(node) => {
                let total = node.counts[0] + node.counts[1];
                if total == 0 {
                    0.0
                } else {
                    node.counts[1] as f64 / total as f64
                }
            }
            None => 0.0,
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes.get(idx) {
                Some(node) if !node.is_leaf() => {
                    1 + walk(nodes, node.left as usize).max(walk(nodes, node.right as usize))
                }
                _ => 0,
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Validate tree structure
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }

        let len = self.nodes.len();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_leaf() {
                match node.leaf {
                    Some(class) if (class as usize) < LabelEncoding::CLASSES => {}
                    Some(class) => return Err(format!("leaf {i} predicts unknown class {class}")),
                    None => return Err(format!("leaf {i} has no class")),
                }
                continue;
            }

            // children always follow their parent, which also rules out cycles
            for (side, child) in [("left", node.left), ("right", node.right)] {
                if child <= i as i32 || child as usize >= len {
                    return Err(format!("node {i} has invalid {side} child {child}"));
                }
            }
            if node.feature_idx < 0 || node.feature_idx as usize >= self.feature_count {
                return Err(format!(
                    "node {i} splits on feature {} of {}",
                    node.feature_idx, self.feature_count
                ));
            }
        }

        Ok(())
    }

    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        to_canonical_json(self)
    }

    pub fn hash_hex(&self) -> Result<String, serde_json::Error> {
        hash_canonical_hex(self)
    }

    /// Write the model and its digest file; `path` must end in `.json`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> std::io::Result<PathBuf> {
        let path = path.as_ref();
        if !has_model_extension(path) {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("model path {} must end in .{MODEL_EXTENSION}", path.display()),
            ));
        }

        let json = self
            .to_canonical_json()
            .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))?;
        let digest = hex::encode(blake3::hash(json.as_bytes()).as_bytes());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &json)?;

        let hash_path = path.with_extension(HASH_EXTENSION);
        fs::write(&hash_path, &digest)?;
        debug!("Saved model {} (blake3 {})", path.display(), digest);

        Ok(hash_path)
    }

    /// Load a model written by [`DecisionTree::save`]
    ///
    /// A digest file next to the model, if present, must match the bytes.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        if !has_model_extension(path) {
            return Err(ModelLoadError::WrongExtension {
                path: path.to_path_buf(),
                expected: MODEL_EXTENSION,
            });
        }

        let bytes = fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ModelLoadError::NotFound(path.to_path_buf()),
            _ => ModelLoadError::Unreadable {
                path: path.to_path_buf(),
                source,
            },
        })?;

        verify_digest(path, &bytes)?;

        let model: DecisionTree =
            serde_json::from_slice(&bytes).map_err(|e| ModelLoadError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        model.validate().map_err(ModelLoadError::Invalid)?;

        Ok(model)
    }
}

impl Classifier for DecisionTree {
    fn predict_class(&self, features: &[u64]) -> u8 {
        if !self.accepts(features) {
            warn!(
                "Feature vector has {} values, model expects {}; prediction is unreliable",
                features.len(),
                self.feature_count
            );
        }
        self.leaf_for(features)
            .and_then(|node| node.leaf)
            .unwrap_or(0)
    }
}

fn has_model_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == MODEL_EXTENSION)
}

fn verify_digest(path: &Path, bytes: &[u8]) -> Result<(), ModelLoadError> {
    let hash_path = path.with_extension(HASH_EXTENSION);
    let expected = match fs::read_to_string(&hash_path) {
        Ok(expected) => expected,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("No digest file for {}; loading unverified", path.display());
            return Ok(());
        }
        Err(source) => {
            return Err(ModelLoadError::Unreadable {
                path: hash_path,
                source,
            })
        }
    };

    let actual = hex::encode(blake3::hash(bytes).as_bytes());
    if expected.trim() != actual {
        return Err(ModelLoadError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("blake3 {actual} does not match {}", expected.trim()),
        });
    }
    Ok(())
}
