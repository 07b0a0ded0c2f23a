//! Flat CSV table store
//!
//! Same append/load contract as the sled table, keyed by an explicit file
//! path. The header is written once, on the first append to an empty file.

use chrono::Utc;
use delphi_features::dataset::format_cell;
use delphi_features::{ColumnMapping, Dataset};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{DatasetStore, Result, StoreError};

/// CSV file holding one feature table
#[derive(Debug, Clone)]
pub struct CsvDatasetStore {
    path: PathBuf,
}

impl CsvDatasetStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Store under `dir` named after the current UTC time,
    /// e.g. `features_20240131_235959.csv`
    pub fn timestamped(dir: &Path) -> Self {
        let name = format!("features_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
        Self::new(dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn has_content(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    /// Refuse to append canonical rows under a foreign header
    fn check_existing_header(&self) -> Result<()> {
        let mut reader = csv::Reader::from_path(&self.path)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        let header = reader
            .headers()
            .map_err(|e| StoreError::Write(e.to_string()))?;

        let columns = Dataset::columns();
        if header.iter().ne(columns.iter().copied()) {
            return Err(StoreError::Write(format!(
                "{} has a non-canonical header; refusing to append",
                self.path.display()
            )));
        }
        Ok(())
    }
}

impl DatasetStore for CsvDatasetStore {
    fn append(&self, dataset: &Dataset) -> Result<()> {
        let write_header = !self.has_content();
        if !write_header {
            self.check_existing_header()?;
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Write(e.to_string()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        let mut writer = csv::Writer::from_writer(file);

        if write_header {
            writer
                .write_record(Dataset::columns())
                .map_err(|e| StoreError::Write(e.to_string()))?;
        }

        for row in dataset.iter() {
            let mut cells: Vec<String> = row.values.iter().map(|v| format_cell(*v)).collect();
            cells.push(row.label.clone());
            writer
                .write_record(&cells)
                .map_err(|e| StoreError::Write(e.to_string()))?;
        }

        writer.flush().map_err(|e| StoreError::Write(e.to_string()))?;
        debug!("Appended {} rows to {}", dataset.len(), self.path.display());
        Ok(())
    }

    fn load(&self) -> Result<Dataset> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| StoreError::Unavailable {
            target: self.path.display().to_string(),
            reason: e.to_string(),
        })?;

        let header: Vec<String> = reader
            .headers()
            .map_err(|e| StoreError::Read(e.to_string()))?
            .iter()
            .map(str::to_string)
            .collect();
        let mapping = ColumnMapping::from_header(&header)?;

        let missing = mapping.missing_columns();
        if !missing.is_empty() {
            warn!(
                "{}: schema mismatch, columns {:?} absent; loaded as missing cells",
                self.path.display(),
                missing
            );
        }

        let mut rows = Vec::new();
        for (n, record) in reader.records().enumerate() {
            let record = record.map_err(|e| StoreError::Read(e.to_string()))?;
            let cells: Vec<&str> = record.iter().collect();
            rows.push(mapping.row_from_cells(n, &cells)?);
        }

        Ok(Dataset::from_rows(rows))
    }

    fn row_count(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let mut reader =
            csv::Reader::from_path(&self.path).map_err(|e| StoreError::Read(e.to_string()))?;
        Ok(reader.records().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_timestamped_name() {
        let dir = TempDir::new().unwrap();
        let store = CsvDatasetStore::timestamped(dir.path());
        let name = store.path().file_name().unwrap().to_string_lossy().to_string();

        assert!(name.starts_with("features_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "features_YYYYMMDD_HHMMSS.csv".len());
    }

    #[test]
    fn test_load_missing_file_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = CsvDatasetStore::new(dir.path().join("absent.csv"));
        assert!(store.load().unwrap_err().is_unavailable());
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_load_tolerates_index_and_absent_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.csv");
        std::fs::write(&path, ",e_cblp,NumberOfSections,label\n0,144,5,malware\n1,,,benign\n")
            .unwrap();

        let dataset = CsvDatasetStore::new(&path).load().unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rows()[0].values[0], Some(144));
        assert_eq!(dataset.rows()[0].values[6], Some(5));
        assert_eq!(dataset.rows()[0].values[1], None);
        assert!(dataset.rows()[1].is_empty());
    }

    #[test]
    fn test_append_refuses_foreign_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foreign.csv");
        std::fs::write(&path, "a,b,label\n1,2,benign\n").unwrap();

        let err = CsvDatasetStore::new(&path).append(&Dataset::new()).unwrap_err();
        assert!(matches!(err, StoreError::Write(_)));
    }
}
