//! Delphi Features - PE header mining for malware classification
//!
//! Turns Windows portable-executable files into fixed-schema feature
//! records and assembles labeled, rectangular datasets from a malware and
//! a benign corpus.
//!
//! Modules:
//! - `label`: Two-variant ground-truth label
//! - `pe`: Header-only PE parser (DOS, COFF and optional headers)
//! - `record`: Canonical feature schema and `FeatureRecord`
//! - `extract`: Per-file extraction with local failure handling
//! - `dataset`: Rectangular dataset with schema normalization
//! - `assembler`: Directory mining into a single dataset

pub mod assembler;
pub mod dataset;
pub mod errors;
pub mod extract;
pub mod label;
pub mod pe;
pub mod record;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use assembler::{assemble, collect_executables, Assembler, CorpusReport, MiningReport};
pub use dataset::{ColumnMapping, Dataset, DatasetRow};
pub use errors::{DatasetError, ExtractionFailure, FailureReason, MiningError};
pub use extract::{extract, extract_bytes};
pub use label::{Label, UnknownLabel};
pub use pe::{PeError, PeHeaders};
pub use record::{column_index, FeatureRecord, FEATURE_COLUMNS, FEATURE_COUNT, LABEL_COLUMN};

/// Crate version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
