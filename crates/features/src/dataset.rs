//! Rectangular labeled dataset
//!
//! Every row carries all 26 feature cells (a cell may be missing) plus the
//! human-readable label. Row identity is positional and is rewritten on
//! every merge so two appended groups never share an index.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::DatasetError;
use crate::record::{column_index, FeatureRecord, FEATURE_COLUMNS, FEATURE_COUNT, LABEL_COLUMN};

/// Name of the optional row-identity column in flat tables
pub const INDEX_COLUMN: &str = "index";

/// A dataset row: feature cells in schema order plus the label string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRow {
    pub index: usize,
    pub values: [Option<u64>; FEATURE_COUNT],
    pub label: String,
}

impl DatasetRow {
    /// True when every feature cell is missing
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// True when no feature cell is missing
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    /// Feature values, or `None` if any cell is missing
    pub fn feature_vector(&self) -> Option<Vec<u64>> {
        self.values.iter().copied().collect()
    }
}

impl From<FeatureRecord> for DatasetRow {
    fn from(record: FeatureRecord) -> Self {
        Self {
            index: 0,
            values: record.values.map(Some),
            label: record.label.as_str().to_string(),
        }
    }
}

/// Collection of rows sharing the canonical schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    rows: Vec<DatasetRow>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from extracted records, indexed from zero
    pub fn from_records<I: IntoIterator<Item = FeatureRecord>>(records: I) -> Self {
        Self::from_rows(records.into_iter().map(DatasetRow::from).collect())
    }

    /// Build from rows, discarding their previous identity
    pub fn from_rows(rows: Vec<DatasetRow>) -> Self {
        let mut dataset = Self { rows };
        dataset.reindex();
        dataset
    }

    /// Concatenate groups in order into one freshly indexed dataset
    pub fn concat<I: IntoIterator<Item = Dataset>>(groups: I) -> Self {
        let mut merged = Self::new();
        for group in groups {
            merged.append(group);
        }
        merged
    }

    /// Append every row of `other`, continuing this dataset's index
    pub fn append(&mut self, other: Dataset) {
        let offset = self.rows.len();
        self.rows
            .extend(other.rows.into_iter().enumerate().map(|(i, mut row)| {
                row.index = offset + i;
                row
            }));
    }

    pub fn push_record(&mut self, record: FeatureRecord) {
        let mut row = DatasetRow::from(record);
        row.index = self.rows.len();
        self.rows.push(row);
    }

    /// Rewrite row identity to `0..len`
    pub fn reindex(&mut self) {
        for (i, row) in self.rows.iter_mut().enumerate() {
            row.index = i;
        }
    }

    /// Remove rows whose feature cells are all missing and compact the index.
    /// Partially populated rows are kept untouched. Returns the number removed.
    pub fn drop_empty_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| !row.is_empty());
        self.reindex();
        before - self.rows.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[DatasetRow] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatasetRow> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<DatasetRow> {
        self.rows
    }

    /// Column names in schema order, label last
    pub fn columns() -> Vec<&'static str> {
        FEATURE_COLUMNS
            .iter()
            .copied()
            .chain(std::iter::once(LABEL_COLUMN))
            .collect()
    }

    /// Row count per label string
    pub fn label_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// `(min, max)` per feature column over the present cells
    pub fn feature_stats(&self) -> Vec<Option<(u64, u64)>> {
        let mut stats: Vec<Option<(u64, u64)>> = vec![None; FEATURE_COUNT];

        for row in &self.rows {
            for (i, value) in row.values.iter().enumerate() {
                if let Some(v) = *value {
                    stats[i] = Some(match stats[i] {
                        None => (v, v),
                        Some((lo, hi)) => (lo.min(v), hi.max(v)),
                    });
                }
            }
        }

        stats
    }
}

/// Maps the columns of an external table onto the canonical schema
///
/// Canonical columns absent from the table become missing cells; columns the
/// schema does not know are rejected rather than silently dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    features: [Option<usize>; FEATURE_COUNT],
    label: usize,
    width: usize,
}

impl ColumnMapping {
    /// Identity mapping for tables written in canonical order (no index column)
    pub fn canonical() -> Self {
        let mut features = [None; FEATURE_COUNT];
        for (i, slot) in features.iter_mut().enumerate() {
            *slot = Some(i);
        }
        Self {
            features,
            label: FEATURE_COUNT,
            width: FEATURE_COUNT + 1,
        }
    }

    pub fn from_header<S: AsRef<str>>(header: &[S]) -> Result<Self, DatasetError> {
        let mut features = [None; FEATURE_COUNT];
        let mut label = None;

        for (pos, name) in header.iter().enumerate() {
            let name = name.as_ref().trim();

            if name == LABEL_COLUMN {
                if label.replace(pos).is_some() {
                    return Err(DatasetError::DuplicateColumn(name.to_string()));
                }
            } else if let Some(i) = column_index(name) {
                if features[i].replace(pos).is_some() {
                    return Err(DatasetError::DuplicateColumn(name.to_string()));
                }
            } else if name.is_empty() || name == INDEX_COLUMN {
                // row identity from the writer; reassigned on load
                continue;
            } else {
                return Err(DatasetError::SchemaMismatch(name.to_string()));
            }
        }

        Ok(Self {
            features,
            label: label.ok_or(DatasetError::MissingLabelColumn)?,
            width: header.len(),
        })
    }

    /// Canonical columns the table does not provide
    pub fn missing_columns(&self) -> Vec<&'static str> {
        self.features
            .iter()
            .zip(FEATURE_COLUMNS.iter())
            .filter(|(pos, _)| pos.is_none())
            .map(|(_, name)| *name)
            .collect()
    }

    /// Convert one table row into a dataset row
    pub fn row_from_cells<S: AsRef<str>>(
        &self,
        row: usize,
        cells: &[S],
    ) -> Result<DatasetRow, DatasetError> {
        if cells.len() != self.width {
            return Err(DatasetError::RowWidth {
                row,
                expected: self.width,
                got: cells.len(),
            });
        }

        let mut values = [None; FEATURE_COUNT];
        for (i, pos) in self.features.iter().enumerate() {
            if let Some(pos) = pos {
                let raw = cells[*pos].as_ref();
                values[i] = parse_cell(raw).ok_or_else(|| DatasetError::InvalidCell {
                    row,
                    column: FEATURE_COLUMNS[i],
                    value: raw.to_string(),
                })?;
            }
        }

        Ok(DatasetRow {
            index: row,
            values,
            label: cells[self.label].as_ref().to_string(),
        })
    }
}

/// Render a feature cell for flat tables; missing cells are empty
pub fn format_cell(value: Option<u64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Parse a feature cell. Outer `None` means the text is not a valid cell.
///
/// Integral floats (`"332.0"`) are accepted since tabular writers widen
/// integer columns that contain gaps.
fn parse_cell(raw: &str) -> Option<Option<u64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Some(None);
    }
    if let Ok(v) = raw.parse::<u64>() {
        return Some(Some(v));
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(Some(f as u64))
    } else {
        None
    }
}
