//! Error types for mining and dataset handling

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::pe::PeError;

/// Why a single file produced no record
#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed PE: {0}")]
    Malformed(#[from] PeError),
}

/// A file that could not be turned into a feature record
///
/// Recovered locally: the assembler logs it and moves on to the next file.
#[derive(Debug, Error)]
#[error("cannot extract features from {}: {reason}", path.display())]
pub struct ExtractionFailure {
    pub path: PathBuf,
    pub reason: FailureReason,
}

/// Dataset schema and cell errors
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("schema mismatch: unknown column {0:?}")]
    SchemaMismatch(String),

    #[error("schema mismatch: duplicate column {0:?}")]
    DuplicateColumn(String),

    #[error("missing \"label\" column")]
    MissingLabelColumn,

    #[error("row {row}: expected {expected} cells, got {got}")]
    RowWidth {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("row {row}, column {column}: invalid value {value:?}")]
    InvalidCell {
        row: usize,
        column: &'static str,
        value: String,
    },
}

/// Fatal mining errors
#[derive(Debug, Error)]
pub enum MiningError {
    #[error("corpus directory {} is not readable: {source}", dir.display())]
    CorpusUnreadable {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}
