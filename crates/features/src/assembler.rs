//! Dataset assembly from a malware and a benign corpus
//!
//! Each corpus directory is scanned (non-recursively) for `.exe` files and
//! every file is extracted once, sequentially. Extraction failures are
//! logged and dropped; only a missing corpus directory aborts the run.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::dataset::Dataset;
use crate::errors::MiningError;
use crate::extract::extract;
use crate::record::FEATURE_COUNT;

/// File suffix of mined executables
pub const EXECUTABLE_SUFFIX: &str = "exe";

const PROGRESS_EVERY: usize = 100;

/// Per-corpus mining counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CorpusReport {
    pub attempted: usize,
    pub extracted: usize,
    pub failed: usize,
}

/// Diagnostics for one mining run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MiningReport {
    pub malware: CorpusReport,
    pub benign: CorpusReport,
    pub feature_columns: usize,
    pub empty_rows_dropped: usize,
    pub rows_retained: usize,
}

impl MiningReport {
    pub fn files_attempted(&self) -> usize {
        self.malware.attempted + self.benign.attempted
    }

    pub fn files_failed(&self) -> usize {
        self.malware.failed + self.benign.failed
    }
}

/// List the executables of a corpus directory, unsorted
pub fn collect_executables(dir: &Path) -> Result<Vec<PathBuf>, MiningError> {
    let unreadable = |source| MiningError::CorpusUnreadable {
        dir: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        let is_executable = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(EXECUTABLE_SUFFIX));

        if is_executable && path.is_file() {
            files.push(path);
        }
    }

    Ok(files)
}

/// Drives the extractor over both corpora
#[derive(Debug, Clone, Default)]
pub struct Assembler;

impl Assembler {
    pub fn new() -> Self {
        Self
    }

    /// Mine both corpora into one dataset (malware rows first)
    pub fn assemble(
        &self,
        malware_dir: &Path,
        benign_dir: &Path,
    ) -> Result<(Dataset, MiningReport), MiningError> {
        info!("----- MINING STATUS -----");
        let (malware, malware_report) = self.mine_corpus(malware_dir, true)?;
        let (benign, benign_report) = self.mine_corpus(benign_dir, false)?;
        info!("-------------------------");

        let mut dataset = Dataset::concat([malware, benign]);
        let empty_rows_dropped = dataset.drop_empty_rows();

        let report = MiningReport {
            malware: malware_report,
            benign: benign_report,
            feature_columns: FEATURE_COUNT,
            empty_rows_dropped,
            rows_retained: dataset.len(),
        };

        info!(
            "Mined {} files ({} skipped): {} feature columns, {} rows retained",
            report.files_attempted(),
            report.files_failed(),
            report.feature_columns,
            report.rows_retained
        );

        Ok((dataset, report))
    }

    fn mine_corpus(
        &self,
        dir: &Path,
        is_malware: bool,
    ) -> Result<(Dataset, CorpusReport), MiningError> {
        let tag = if is_malware { "Mal" } else { "Ben" };
        let paths = collect_executables(dir)?;
        let total = paths.len();
        info!("{}: {} executables in {}", tag, total, dir.display());

        let mut dataset = Dataset::new();
        let mut report = CorpusReport {
            attempted: total,
            ..Default::default()
        };

        for (i, path) in paths.iter().enumerate() {
            match extract(path, is_malware) {
                Ok(record) => {
                    debug!("{}: extracted {}", tag, path.display());
                    dataset.push_record(record);
                    report.extracted += 1;
                }
                Err(failure) => {
                    warn!("{}: skipping file: {}", tag, failure);
                    report.failed += 1;
                }
            }

            if (i + 1) % PROGRESS_EVERY == 0 {
                info!("{}: {}/{}", tag, i + 1, total);
            }
        }

        info!(
            "{}: {}/{} extracted, {} failed",
            tag, report.extracted, total, report.failed
        );

        Ok((dataset, report))
    }
}

/// Mine `malware_dir` and `benign_dir` into one dataset
pub fn assemble(malware_dir: &Path, benign_dir: &Path) -> Result<Dataset, MiningError> {
    Assembler::new()
        .assemble(malware_dir, benign_dir)
        .map(|(dataset, _)| dataset)
}
