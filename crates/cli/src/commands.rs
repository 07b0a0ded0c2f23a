//! Subcommand handlers
//!
//! Each handler runs one stage end to end and tags failures with the stage
//! name, so a fatal error reads as "mining: ...", "storing: ..." and so on.

use anyhow::{bail, Context, Result};
use delphi_features::{Assembler, Dataset, MiningReport, FEATURE_COLUMNS};
use delphi_storage::{connect, CsvDatasetStore, DatasetStore};
use delphi_trainer::{Predictor, Trainer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::settings::Settings;

/// Summary printed by `train`
#[derive(Debug, Serialize)]
pub struct TrainSummary {
    pub rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub holdout_accuracy: f64,
    pub nodes: usize,
    pub depth: usize,
    pub model_path: PathBuf,
    pub model_hash: String,
}

/// One line of `predict` output
#[derive(Debug, Serialize)]
pub struct Prediction {
    pub path: PathBuf,
    pub label: Option<String>,
    pub malware_probability: Option<f64>,
    pub error: Option<String>,
}

fn open_store(settings: &Settings) -> Result<Option<Box<dyn DatasetStore>>> {
    let Some(connection) = settings.store.connection.as_deref() else {
        return Ok(None);
    };
    let store = connect(
        connection,
        &settings.store.table,
        settings.store.connect_timeout(),
    )
    .with_context(|| format!("storing: cannot open {connection}"))?;
    Ok(Some(store))
}

fn mine(settings: &Settings) -> Result<(Dataset, MiningReport)> {
    let malware_dir = settings.paths.malware_dir();
    let benign_dir = settings.paths.benign_dir();
    Assembler::new()
        .assemble(&malware_dir, &benign_dir)
        .context("mining")
}

/// Mine both corpora into a timestamped CSV under the output directory
pub fn mine_to_csv(settings: &Settings) -> Result<(PathBuf, MiningReport)> {
    let (dataset, report) = mine(settings)?;

    let store = CsvDatasetStore::timestamped(&settings.paths.output_dir());
    store
        .append(&dataset)
        .with_context(|| format!("storing: cannot write {}", store.path().display()))?;

    info!("Wrote {} rows to {}", dataset.len(), store.path().display());
    Ok((store.path().to_path_buf(), report))
}

/// Append a mined CSV to the configured store
pub fn upload(settings: &Settings, file: &Path) -> Result<usize> {
    let mut dataset = CsvDatasetStore::new(file)
        .load()
        .with_context(|| format!("storing: cannot read {}", file.display()))?;
    dataset.drop_empty_rows();

    let Some(store) = open_store(settings)? else {
        bail!("storing: no store.connection configured");
    };
    store.append(&dataset).context("storing")?;

    info!("Uploaded {} rows from {}", dataset.len(), file.display());
    Ok(dataset.len())
}

fn training_dataset(settings: &Settings) -> Result<Dataset> {
    let store = open_store(settings)?;

    if settings.read_features_from_db {
        let Some(store) = store else {
            bail!("storing: read_features_from_db requires store.connection");
        };
        let mut dataset = store.load().context("storing: cannot load features")?;
        let dropped = dataset.drop_empty_rows();
        info!(
            "Loaded {} rows from the store ({} empty rows dropped)",
            dataset.len(),
            dropped
        );
        return Ok(dataset);
    }

    let (dataset, _) = mine(settings)?;
    if let Some(store) = store {
        store
            .append(&dataset)
            .context("storing: cannot save mined features")?;
    }
    Ok(dataset)
}

fn log_feature_stats(dataset: &Dataset) {
    for (column, range) in FEATURE_COLUMNS.iter().zip(dataset.feature_stats()) {
        match range {
            Some((min, max)) => info!("  {:<28} min {:>12} max {:>12}", column, min, max),
            None => info!("  {:<28} (no values)", column),
        }
    }
    for (label, count) in dataset.label_counts() {
        info!("  label {:<8} {}", label, count);
    }
}

/// Mine or load the feature set, train and persist the model
pub fn train(settings: &Settings) -> Result<TrainSummary> {
    let dataset = training_dataset(settings)?;

    info!("Feature statistics over {} rows:", dataset.len());
    log_feature_stats(&dataset);

    let outcome = Trainer::new(settings.training_params())
        .train(&dataset)
        .context("training")?;

    let model_path = settings.paths.model_path();
    outcome
        .model
        .save(&model_path)
        .with_context(|| format!("training: cannot write {}", model_path.display()))?;
    let model_hash = outcome.model.hash_hex().context("training")?;
    info!("Model written to {} (blake3 {})", model_path.display(), model_hash);

    Ok(TrainSummary {
        rows: dataset.len(),
        train_rows: outcome.train_rows(),
        test_rows: outcome.test_rows(),
        holdout_accuracy: outcome.holdout_accuracy,
        nodes: outcome.model.nodes.len(),
        depth: outcome.model.depth(),
        model_path,
        model_hash,
    })
}

/// Classify each executable with the model at `model`
///
/// Files that cannot be parsed are reported individually; the run only
/// fails when the model itself cannot be loaded.
pub fn predict(model: &Path, executables: &[PathBuf]) -> Result<Vec<Prediction>> {
    let predictor = Predictor::load(model).context("predicting")?;

    let predictions = executables
        .iter()
        .map(|path| match delphi_features::extract(path, false) {
            Ok(record) => Prediction {
                path: path.clone(),
                label: Some(predictor.predict(&record).to_string()),
                malware_probability: Some(predictor.malware_probability(&record)),
                error: None,
            },
            Err(failure) => {
                warn!("predicting: {}", failure);
                Prediction {
                    path: path.clone(),
                    label: None,
                    malware_probability: None,
                    error: Some(failure.reason.to_string()),
                }
            }
        })
        .collect();

    Ok(predictions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{DataDirs, PathSettings};
    use delphi_features::fixtures::PeImageBuilder;
    use std::fs;
    use tempfile::TempDir;

    fn settings_in(root: &Path) -> Settings {
        Settings {
            paths: PathSettings {
                proj_root: root.to_path_buf(),
                data_dirs: DataDirs {
                    malware: PathBuf::from("mal"),
                    benign: PathBuf::from("ben"),
                },
                output_dir: PathBuf::from("out"),
                model_path: PathBuf::from("out/model.json"),
            },
            ..Default::default()
        }
    }

    fn write_corpora(root: &Path) {
        let mal = root.join("mal");
        let ben = root.join("ben");
        fs::create_dir_all(&mal).unwrap();
        fs::create_dir_all(&ben).unwrap();
        for i in 0..6u16 {
            PeImageBuilder::pe32()
                .sections(9 + i)
                .write_to(&mal.join(format!("m{i}.exe")))
                .unwrap();
            PeImageBuilder::pe32_plus()
                .sections(2)
                .write_to(&ben.join(format!("b{i}.exe")))
                .unwrap();
        }
        fs::write(mal.join("broken.exe"), b"MZ").unwrap();
    }

    #[test]
    fn test_mine_train_reload_predict() {
        let dir = TempDir::new().unwrap();
        write_corpora(dir.path());

        let mut settings = settings_in(dir.path());
        settings.store.connection = Some(format!("csv://{}", dir.path().join("db.csv").display()));

        let (csv, report) = mine_to_csv(&settings).unwrap();
        assert!(csv.starts_with(dir.path().join("out")));
        assert_eq!(report.rows_retained, 12);
        assert_eq!(report.files_failed(), 1);

        // mined features are appended to the configured store
        let summary = train(&settings).unwrap();
        assert_eq!(summary.rows, 12);
        assert_eq!(summary.train_rows + summary.test_rows, 12);
        assert!(summary.model_path.exists());

        assert_eq!(upload(&settings, &csv).unwrap(), 12);

        settings.read_features_from_db = true;
        let from_store = train(&settings).unwrap();
        assert_eq!(from_store.rows, 24);

        let probe = dir.path().join("mal").join("m0.exe");
        let missing = dir.path().join("absent.exe");
        let predictions = predict(&from_store.model_path, &[probe, missing]).unwrap();
        assert_eq!(predictions[0].label.as_deref(), Some("malware"));
        assert!(predictions[1].error.is_some());
    }

    #[test]
    fn test_upload_requires_store() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("features.csv");
        fs::write(&csv, format!("{},label\n", FEATURE_COLUMNS.join(","))).unwrap();

        let err = upload(&settings_in(dir.path()), &csv).unwrap_err();
        assert!(err.to_string().contains("storing"));
    }

    #[test]
    fn test_mining_missing_corpus_names_stage() {
        let dir = TempDir::new().unwrap();
        let err = mine_to_csv(&settings_in(dir.path())).unwrap_err();
        assert!(err.to_string().starts_with("mining"));
    }

    #[test]
    fn test_predict_missing_model_names_stage() {
        let dir = TempDir::new().unwrap();
        let err = predict(&dir.path().join("absent.json"), &[]).unwrap_err();
        assert!(err.to_string().starts_with("predicting"));
    }
}
