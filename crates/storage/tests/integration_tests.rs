//! Integration tests for dataset stores (sled, CSV and in-memory).
//! Covers append/load round trips, the additive-only append policy and
//! unreachable or slow store handling.

use delphi_features::{Dataset, DatasetRow, FeatureRecord, Label, FEATURE_COUNT};
use delphi_storage::{
    connect, CsvDatasetStore, DatasetStore, MemoryDatasetStore, SledDatasetStore, StoreError,
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_TABLE,
};
use std::time::Duration;
use tempfile::TempDir;

/// Helper to create a record with distinguishable values
fn create_test_record(seed: u64, label: Label) -> FeatureRecord {
    let mut values = [0u64; FEATURE_COUNT];
    for (i, v) in values.iter_mut().enumerate() {
        *v = seed * 1_000 + i as u64;
    }
    FeatureRecord { values, label }
}

/// Helper to create a small mixed dataset
fn create_test_dataset() -> Dataset {
    Dataset::from_records(vec![
        create_test_record(1, Label::Malware),
        create_test_record(2, Label::Malware),
        create_test_record(3, Label::Benign),
    ])
}

/// Row content without identity, sorted so order does not matter
fn content(dataset: &Dataset) -> Vec<(Vec<Option<u64>>, String)> {
    let mut rows: Vec<_> = dataset
        .iter()
        .map(|r: &DatasetRow| (r.values.to_vec(), r.label.clone()))
        .collect();
    rows.sort();
    rows
}

fn exercise_round_trip<S: DatasetStore>(store: &S) {
    let dataset = create_test_dataset();
    assert_eq!(store.row_count().unwrap(), 0);

    store.append(&dataset).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(content(&loaded), content(&dataset));

    let indices: Vec<usize> = loaded.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

fn exercise_double_append<S: DatasetStore>(store: &S) {
    let dataset = create_test_dataset();
    store.append(&dataset).unwrap();
    store.append(&dataset).unwrap();

    assert_eq!(store.row_count().unwrap(), 2 * dataset.len());
    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 6);

    // identity is unique even though both appends started at index 0
    let mut indices: Vec<usize> = loaded.iter().map(|r| r.index).collect();
    indices.dedup();
    assert_eq!(indices.len(), 6);
}

#[test]
fn test_sled_round_trip() {
    let dir = TempDir::new().unwrap();
    let store =
        SledDatasetStore::connect(dir.path().join("db"), DEFAULT_TABLE, DEFAULT_CONNECT_TIMEOUT)
            .unwrap();
    assert_eq!(store.table_name(), DEFAULT_TABLE);
    exercise_round_trip(&store);
}

#[test]
fn test_sled_append_is_additive() {
    let dir = TempDir::new().unwrap();
    let store =
        SledDatasetStore::connect(dir.path().join("db"), DEFAULT_TABLE, DEFAULT_CONNECT_TIMEOUT)
            .unwrap();
    exercise_double_append(&store);
}

#[test]
fn test_sled_unreachable_is_unavailable() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not_a_dir");
    std::fs::write(&blocker, b"occupied").unwrap();

    let err = SledDatasetStore::connect(blocker.join("db"), DEFAULT_TABLE, DEFAULT_CONNECT_TIMEOUT)
        .err()
        .unwrap();
    assert!(err.is_unavailable());
}

#[test]
fn test_sled_connect_is_bounded() {
    let dir = TempDir::new().unwrap();
    let timeout = Duration::from_nanos(1);

    let err = SledDatasetStore::connect(dir.path().join("db"), DEFAULT_TABLE, timeout)
        .err()
        .unwrap();
    assert!(matches!(err, StoreError::ConnectTimeout { timeout: t, .. } if t == timeout));
    assert!(err.is_unavailable());
}

#[test]
fn test_csv_round_trip_with_gaps() {
    let dir = TempDir::new().unwrap();
    let store = CsvDatasetStore::new(dir.path().join("features.csv"));

    let mut rows = create_test_dataset().into_rows();
    rows[1].values[10] = None;
    let dataset = Dataset::from_rows(rows);

    store.append(&dataset).unwrap();
    let loaded = store.load().unwrap();
    assert_eq!(content(&loaded), content(&dataset));
    assert_eq!(loaded.rows()[1].values[10], None);
}

#[test]
fn test_csv_append_is_additive() {
    let dir = TempDir::new().unwrap();
    exercise_double_append(&CsvDatasetStore::new(dir.path().join("features.csv")));
}

#[test]
fn test_memory_store_contract() {
    exercise_round_trip(&MemoryDatasetStore::default());
    exercise_double_append(&MemoryDatasetStore::default());
}

#[test]
fn test_connect_dispatches_on_scheme() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("table.csv");

    let store = connect(
        &format!("csv://{}", csv_path.display()),
        DEFAULT_TABLE,
        DEFAULT_CONNECT_TIMEOUT,
    )
    .unwrap();
    store.append(&create_test_dataset()).unwrap();
    assert!(csv_path.exists());

    let store = connect(
        &format!("sled://{}", dir.path().join("db").display()),
        DEFAULT_TABLE,
        DEFAULT_CONNECT_TIMEOUT,
    )
    .unwrap();
    assert_eq!(store.row_count().unwrap(), 0);
}
