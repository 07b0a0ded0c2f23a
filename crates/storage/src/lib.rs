use delphi_features::{ColumnMapping, Dataset, DatasetError, DatasetRow, FEATURE_COLUMNS, LABEL_COLUMN};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use sled::{Batch, Db, Tree};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod csv_store;

pub use csv_store::CsvDatasetStore;

/// Default table holding mined features
pub const DEFAULT_TABLE: &str = "mal_clf_features";

/// Default bound on opening a store
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store unavailable ({target}): {reason}")]
    Unavailable { target: String, reason: String },

    #[error("store connection to {target} timed out after {timeout:?}")]
    ConnectTimeout { target: String, timeout: Duration },

    #[error("store write failed: {0}")]
    Write(String),

    #[error("store read failed: {0}")]
    Read(String),

    #[error("invalid store connection string {0:?}")]
    InvalidConnection(String),

    #[error(transparent)]
    Schema(#[from] DatasetError),
}

impl StoreError {
    /// The store could not be reached at all
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::ConnectTimeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Append-only dataset persistence
///
/// `append` never overwrites or deduplicates: appending the same dataset
/// twice stores its rows twice. Callers own idempotence.
pub trait DatasetStore {
    fn append(&self, dataset: &Dataset) -> Result<()>;
    fn load(&self) -> Result<Dataset>;
    fn row_count(&self) -> Result<usize>;
}

/// Where a connection string points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreTarget {
    Sled(PathBuf),
    Csv(PathBuf),
    Memory,
}

impl StoreTarget {
    /// Parse `sled://<path>`, `csv://<path>`, `memory://` or a bare sled path
    pub fn parse(connection: &str) -> Result<Self> {
        let connection = connection.trim();
        if connection.is_empty() {
            return Err(StoreError::InvalidConnection(connection.to_string()));
        }

        match connection.split_once("://") {
            Some(("sled", path)) if !path.is_empty() => Ok(StoreTarget::Sled(PathBuf::from(path))),
            Some(("csv", path)) if !path.is_empty() => Ok(StoreTarget::Csv(PathBuf::from(path))),
            Some(("memory", _)) => Ok(StoreTarget::Memory),
            Some(_) => Err(StoreError::InvalidConnection(connection.to_string())),
            None => Ok(StoreTarget::Sled(PathBuf::from(connection))),
        }
    }
}

/// Open the store named by `connection`, bounded by `timeout`
pub fn connect(connection: &str, table: &str, timeout: Duration) -> Result<Box<dyn DatasetStore>> {
    match StoreTarget::parse(connection)? {
        StoreTarget::Sled(path) => Ok(Box::new(SledDatasetStore::connect(&path, table, timeout)?)),
        StoreTarget::Csv(path) => Ok(Box::new(CsvDatasetStore::new(path))),
        StoreTarget::Memory => Ok(Box::new(MemoryDatasetStore::default())),
    }
}

/// Sled-backed table of feature rows
///
/// Each row is a JSON object keyed by column name under a store-generated,
/// monotonically increasing id, so appends never collide with existing rows.
pub struct SledDatasetStore {
    db: Db,
    table: Tree,
    table_name: String,
}

impl SledDatasetStore {
    /// Single bounded attempt to open the database at `path`
    pub fn connect<P: AsRef<Path>>(path: P, table: &str, timeout: Duration) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let target = path.display().to_string();
        let (tx, rx) = mpsc::channel();

        let open_path = path.clone();
        thread::spawn(move || {
            // receiver may be gone after a timeout
            let _ = tx.send(sled::open(open_path));
        });

        let db = match rx.recv_timeout(timeout) {
            Ok(Ok(db)) => db,
            Ok(Err(e)) => {
                return Err(StoreError::Unavailable {
                    target,
                    reason: e.to_string(),
                })
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                return Err(StoreError::ConnectTimeout { target, timeout })
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(StoreError::Unavailable {
                    target,
                    reason: "open worker exited".to_string(),
                })
            }
        };

        let tree = db.open_tree(table).map_err(|e| StoreError::Unavailable {
            target: format!("{target}#{table}"),
            reason: e.to_string(),
        })?;

        info!("Connected to sled store {} (table {})", path.display(), table);

        Ok(Self {
            db,
            table: tree,
            table_name: table.to_string(),
        })
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| StoreError::Write(e.to_string()))
    }
}

impl DatasetStore for SledDatasetStore {
    fn append(&self, dataset: &Dataset) -> Result<()> {
        let mut batch = Batch::default();

        for row in dataset.iter() {
            let id = self
                .db
                .generate_id()
                .map_err(|e| StoreError::Write(e.to_string()))?;
            let value = serde_json::to_vec(&row_to_object(row))
                .map_err(|e| StoreError::Write(e.to_string()))?;
            batch.insert(id.to_be_bytes().to_vec(), value);
        }

        self.table
            .apply_batch(batch)
            .map_err(|e| StoreError::Write(e.to_string()))?;
        self.flush()?;

        debug!("Appended {} rows to {}", dataset.len(), self.table_name);
        Ok(())
    }

    fn load(&self) -> Result<Dataset> {
        let mut rows = Vec::with_capacity(self.table.len());

        for (n, entry) in self.table.iter().enumerate() {
            let (_, bytes) = entry.map_err(|e| StoreError::Read(e.to_string()))?;
            let object: Map<String, Value> =
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Read(e.to_string()))?;
            rows.push(row_from_object(n, &object)?);
        }

        Ok(Dataset::from_rows(rows))
    }

    fn row_count(&self) -> Result<usize> {
        Ok(self.table.len())
    }
}

/// In-memory testing backend
#[derive(Default, Clone)]
pub struct MemoryDatasetStore {
    rows: Arc<RwLock<Vec<DatasetRow>>>,
}

impl DatasetStore for MemoryDatasetStore {
    fn append(&self, dataset: &Dataset) -> Result<()> {
        self.rows.write().extend(dataset.iter().cloned());
        Ok(())
    }

    fn load(&self) -> Result<Dataset> {
        Ok(Dataset::from_rows(self.rows.read().clone()))
    }

    fn row_count(&self) -> Result<usize> {
        Ok(self.rows.read().len())
    }
}

fn row_to_object(row: &DatasetRow) -> Map<String, Value> {
    let mut object = Map::with_capacity(FEATURE_COLUMNS.len() + 1);
    for (name, value) in FEATURE_COLUMNS.iter().zip(row.values.iter()) {
        object.insert(
            name.to_string(),
            value.map(Value::from).unwrap_or(Value::Null),
        );
    }
    object.insert(LABEL_COLUMN.to_string(), Value::String(row.label.clone()));
    object
}

fn row_from_object(n: usize, object: &Map<String, Value>) -> Result<DatasetRow> {
    let header: Vec<&str> = object.keys().map(String::as_str).collect();
    let mapping = ColumnMapping::from_header(&header)?;

    let missing = mapping.missing_columns();
    if !missing.is_empty() {
        warn!("Stored row {} lacks columns {:?}; treating them as missing", n, missing);
    }

    let cells: Vec<String> = object
        .values()
        .map(|value| match value {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    Ok(mapping.row_from_cells(n, &cells)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_targets() {
        assert_eq!(
            StoreTarget::parse("sled://data/features.db").unwrap(),
            StoreTarget::Sled(PathBuf::from("data/features.db"))
        );
        assert_eq!(
            StoreTarget::parse("csv:///tmp/features.csv").unwrap(),
            StoreTarget::Csv(PathBuf::from("/tmp/features.csv"))
        );
        assert_eq!(StoreTarget::parse("memory://").unwrap(), StoreTarget::Memory);
        assert_eq!(
            StoreTarget::parse("features.db").unwrap(),
            StoreTarget::Sled(PathBuf::from("features.db"))
        );
        assert!(StoreTarget::parse("postgres://localhost/db").is_err());
        assert!(StoreTarget::parse("").is_err());
        assert!(StoreTarget::parse("sled://").is_err());
    }

    #[test]
    fn test_object_round_trip_keeps_gaps() {
        let mut values = [Some(1u64); FEATURE_COLUMNS.len()];
        values[4] = None;
        let row = DatasetRow {
            index: 9,
            values,
            label: "benign".to_string(),
        };

        let object = row_to_object(&row);
        assert_eq!(object.get("e_sp"), Some(&Value::Null));

        let back = row_from_object(0, &object).unwrap();
        assert_eq!(back.values, row.values);
        assert_eq!(back.label, row.label);
    }

    #[test]
    fn test_object_with_unknown_column_is_rejected() {
        let mut object = Map::new();
        object.insert("label".to_string(), Value::from("malware"));
        object.insert("Entropy".to_string(), Value::from(7));

        let err = row_from_object(0, &object).unwrap_err();
        assert!(matches!(err, StoreError::Schema(DatasetError::SchemaMismatch(_))));
    }
}
