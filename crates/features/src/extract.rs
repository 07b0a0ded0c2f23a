//! Per-file feature extraction
//!
//! Only the header prefix of each file is read. Any I/O or parse problem is
//! returned as an `ExtractionFailure` value; nothing here panics on bad input.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::{ExtractionFailure, FailureReason};
use crate::label::Label;
use crate::pe::{PeError, PeHeaders, DOS_HEADER_SIZE};
use crate::record::FeatureRecord;

/// Extract the feature record of one PE file
pub fn extract(path: &Path, is_malware: bool) -> Result<FeatureRecord, ExtractionFailure> {
    let label = Label::from_flag(is_malware);

    read_header_prefix(path)
        .and_then(|data| extract_bytes(&data, label).map_err(FailureReason::from))
        .map_err(|reason| ExtractionFailure {
            path: path.to_path_buf(),
            reason,
        })
}

/// Extract a feature record from an in-memory image
pub fn extract_bytes(data: &[u8], label: Label) -> Result<FeatureRecord, PeError> {
    let headers = PeHeaders::parse(data)?;
    Ok(FeatureRecord::from_headers(&headers, label))
}

/// Read the DOS header, then just enough to cover the NT headers
fn read_header_prefix(path: &Path) -> Result<Vec<u8>, FailureReason> {
    let mut file = File::open(path)?;
    let mut data = Vec::with_capacity(DOS_HEADER_SIZE);

    (&mut file)
        .take(DOS_HEADER_SIZE as u64)
        .read_to_end(&mut data)?;

    let e_lfanew = PeHeaders::peek_lfanew(&data)?;
    let remaining = PeHeaders::required_len(e_lfanew).saturating_sub(data.len());
    file.take(remaining as u64).read_to_end(&mut data)?;

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{corrupt_image, PeImageBuilder};
    use crate::record::FEATURE_COUNT;
    use tempfile::TempDir;

    #[test]
    fn test_extract_labels_from_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.exe");
        PeImageBuilder::pe32().sections(4).write_to(&path).unwrap();

        let malware = extract(&path, true).unwrap();
        assert_eq!(malware.label, Label::Malware);
        assert_eq!(malware.values.len(), FEATURE_COUNT);
        assert_eq!(malware.get("NumberOfSections"), Some(4));

        let benign = extract(&path, false).unwrap();
        assert_eq!(benign.label, Label::Benign);
        assert_eq!(benign.values, malware.values);
    }

    #[test]
    fn test_extract_pe32_plus() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x64.exe");
        PeImageBuilder::pe32_plus()
            .heap(0x20_0000_0000, 0x4000)
            .write_to(&path)
            .unwrap();

        let record = extract(&path, false).unwrap();
        assert_eq!(record.get("SizeOfHeapReserve"), Some(0x20_0000_0000));
        assert_eq!(record.get("SizeOfHeapCommit"), Some(0x4000));
    }

    #[test]
    fn test_extract_failures_are_values() {
        let dir = TempDir::new().unwrap();

        let corrupt = dir.path().join("corrupt.exe");
        std::fs::write(&corrupt, corrupt_image()).unwrap();
        let err = extract(&corrupt, true).unwrap_err();
        assert_eq!(err.path, corrupt);
        assert!(matches!(
            err.reason,
            FailureReason::Malformed(PeError::LfanewOutOfRange(0x4000))
        ));

        let empty = dir.path().join("empty.exe");
        std::fs::write(&empty, b"").unwrap();
        let err = extract(&empty, true).unwrap_err();
        assert!(matches!(
            err.reason,
            FailureReason::Malformed(PeError::TooSmall(0))
        ));

        let missing = dir.path().join("missing.exe");
        let err = extract(&missing, false).unwrap_err();
        assert!(matches!(err.reason, FailureReason::Io(_)));
        assert!(err.to_string().contains("missing.exe"));
    }
}
