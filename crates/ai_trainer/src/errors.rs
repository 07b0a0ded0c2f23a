use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("dataset is empty")]
    EmptyDataset,

    #[error("row {row}: invalid label {label:?} (expected \"malware\" or \"benign\")")]
    InvalidLabel { row: usize, label: String },

    #[error("row {row}: feature {column} is missing")]
    IncompleteRow { row: usize, column: &'static str },

    #[error("invalid split: {0}")]
    InvalidSplit(String),

    #[error("training error: {0}")]
    Training(String),
}

/// Errors raised while loading a persisted model.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("model file {} must end in .{expected}", path.display())]
    WrongExtension { path: PathBuf, expected: &'static str },

    #[error("cannot read model file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model file {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("model failed validation: {0}")]
    Invalid(String),
}
