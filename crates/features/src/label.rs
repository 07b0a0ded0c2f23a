//! Ground-truth label attached to every feature record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label string could not be mapped to a known class
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown label {0:?} (expected \"malware\" or \"benign\")")]
pub struct UnknownLabel(pub String);

/// Binary classification label
///
/// The string spellings are part of the persisted schema and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Benign,
    Malware,
}

impl Label {
    pub const ALL: [Label; 2] = [Label::Benign, Label::Malware];

    /// Map the miner's `is_malware` flag to a label
    pub fn from_flag(is_malware: bool) -> Self {
        if is_malware {
            Label::Malware
        } else {
            Label::Benign
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Benign => "benign",
            Label::Malware => "malware",
        }
    }

    pub fn is_malware(&self) -> bool {
        matches!(self, Label::Malware)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = UnknownLabel;

    /// Exact, case-sensitive match against the persisted spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "benign" => Ok(Label::Benign),
            "malware" => Ok(Label::Malware),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}
