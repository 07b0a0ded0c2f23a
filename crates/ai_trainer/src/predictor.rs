//! Loading a persisted model and classifying feature records

use delphi_features::{extract, Dataset, ExtractionFailure, FeatureRecord, Label};
use std::path::Path;
use tracing::info;

use crate::encoding::LabelEncoding;
use crate::errors::{ModelLoadError, TrainerError};
use crate::learner::Classifier;
use crate::model::DecisionTree;
use crate::trainer::feature_matrix;

/// Classifies executables with a loaded model
#[derive(Debug, Clone)]
pub struct Predictor {
    model: DecisionTree,
}

impl Predictor {
    pub fn new(model: DecisionTree) -> Self {
        Self { model }
    }

    /// Load the model at `path`, which must be an existing `.json` file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let model = DecisionTree::load(path)?;
        info!(
            "Loaded model {} ({} nodes, depth {})",
            path.display(),
            model.nodes.len(),
            model.depth()
        );
        Ok(Self::new(model))
    }

    pub fn model(&self) -> &DecisionTree {
        &self.model
    }

    /// Label for one record; the record's own label is ignored
    pub fn predict(&self, record: &FeatureRecord) -> Label {
        self.label_for(&record.values)
    }

    /// Probability that `record` is malware, from its leaf's class counts
    pub fn malware_probability(&self, record: &FeatureRecord) -> f64 {
        self.model.malware_probability(&record.values)
    }

    /// Labels for every row of `dataset`, in row order
    ///
    /// Row labels are ignored; every feature cell must be present.
    pub fn predict_batch(&self, dataset: &Dataset) -> Result<Vec<Label>, TrainerError> {
        let features = feature_matrix(dataset)?;
        Ok(features.iter().map(|row| self.label_for(row)).collect())
    }

    /// Extract `path` and classify it
    pub fn predict_file(&self, path: &Path) -> Result<Label, ExtractionFailure> {
        // the placeholder label does not reach the model
        let record = extract(path, false)?;
        Ok(self.predict(&record))
    }

    fn label_for(&self, features: &[u64]) -> Label {
        let class = self.model.predict_class(features);
        LabelEncoding.decode(class).unwrap_or(Label::Benign)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Node;
    use delphi_features::fixtures::PeImageBuilder;
    use delphi_features::{column_index, DatasetRow, FEATURE_COUNT};
    use tempfile::TempDir;

    fn sections_model() -> DecisionTree {
        // more than three sections -> malware
        let feature = column_index("NumberOfSections").unwrap() as i32;
        DecisionTree::new(
            FEATURE_COUNT,
            vec![
                Node::internal(0, feature, 3, 1, 2, [2, 2]),
                Node::leaf(1, 0, [2, 0]),
                Node::leaf(2, 1, [0, 2]),
            ],
        )
    }

    #[test]
    fn test_predict_ignores_record_label() {
        let predictor = Predictor::new(sections_model());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packed.exe");
        PeImageBuilder::pe32().sections(6).write_to(&path).unwrap();

        let as_benign = extract(&path, false).unwrap();
        let as_malware = extract(&path, true).unwrap();
        assert_eq!(predictor.predict(&as_benign), Label::Malware);
        assert_eq!(predictor.predict(&as_malware), Label::Malware);
        assert_eq!(predictor.predict_file(&path).unwrap(), Label::Malware);
        assert_eq!(predictor.malware_probability(&as_benign), 1.0);
    }

    #[test]
    fn test_predict_batch_ignores_row_labels() {
        let predictor = Predictor::new(sections_model());
        let sections = column_index("NumberOfSections").unwrap();

        let rows: Vec<DatasetRow> = [2u64, 7, 3, 9]
            .iter()
            .map(|&n| {
                let mut values = [Some(1u64); FEATURE_COUNT];
                values[sections] = Some(n);
                DatasetRow {
                    index: 0,
                    values,
                    label: String::new(),
                }
            })
            .collect();
        let dataset = Dataset::from_rows(rows);

        assert_eq!(
            predictor.predict_batch(&dataset).unwrap(),
            vec![Label::Benign, Label::Malware, Label::Benign, Label::Malware]
        );
    }

    #[test]
    fn test_predict_batch_rejects_missing_cells() {
        let predictor = Predictor::new(sections_model());
        let mut values = [Some(1u64); FEATURE_COUNT];
        values[5] = None;
        let dataset = Dataset::from_rows(vec![DatasetRow {
            index: 0,
            values,
            label: "unknown".to_string(),
        }]);

        let err = predictor.predict_batch(&dataset).unwrap_err();
        assert!(matches!(err, TrainerError::IncompleteRow { row: 0, .. }));
    }

    #[test]
    fn test_predict_file_reports_bad_input() {
        let predictor = Predictor::new(sections_model());
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.exe");
        std::fs::write(&path, b"plain text").unwrap();

        assert!(predictor.predict_file(&path).is_err());
    }

    #[test]
    fn test_load_rejects_missing_and_misnamed() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Predictor::load(dir.path().join("model.json")),
            Err(ModelLoadError::NotFound(_))
        ));
        assert!(matches!(
            Predictor::load(dir.path().join("model.txt")),
            Err(ModelLoadError::WrongExtension { .. })
        ));
    }
}
