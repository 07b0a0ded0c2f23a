//! Canonical feature schema
//!
//! Column order below is the on-disk and in-model schema. Appending,
//! loading and prediction all index features by this order.

use serde::{Deserialize, Serialize};

use crate::label::Label;
use crate::pe::PeHeaders;

/// Number of numeric feature columns
pub const FEATURE_COUNT: usize = 26;

/// Name of the categorical label column
pub const LABEL_COLUMN: &str = "label";

/// Feature column names in schema order
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    // DOS header
    "e_cblp",
    "e_cp",
    "e_cparhdr",
    "e_maxalloc",
    "e_sp",
    "e_lfanew",
    // File header
    "NumberOfSections",
    // Optional header
    "MajorLinkerVersion",
    "MinorLinkerVersion",
    "SizeOfCode",
    "SizeOfInitializedData",
    "SizeOfUninitializedData",
    "AddressOfEntryPoint",
    "BaseOfCode",
    "MajorOperatingSystemVersion",
    "MinorOperatingSystemVersion",
    "MajorImageVersion",
    "MinorImageVersion",
    "CheckSum",
    "MajorSubsystemVersion",
    "MinorSubsystemVersion",
    "Subsystem",
    "SizeOfStackReserve",
    "SizeOfStackCommit",
    "SizeOfHeapReserve",
    "SizeOfHeapCommit",
];

/// Position of `name` in the feature schema
pub fn column_index(name: &str) -> Option<usize> {
    FEATURE_COLUMNS.iter().position(|c| *c == name)
}

/// One fully populated row of header features plus its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub values: [u64; FEATURE_COUNT],
    pub label: Label,
}

impl FeatureRecord {
    pub fn from_headers(headers: &PeHeaders, label: Label) -> Self {
        let dos = &headers.dos;
        let file = &headers.file;
        let opt = &headers.optional;

        let values = [
            dos.e_cblp as u64,
            dos.e_cp as u64,
            dos.e_cparhdr as u64,
            dos.e_maxalloc as u64,
            dos.e_sp as u64,
            dos.e_lfanew as u64,
            file.number_of_sections as u64,
            opt.major_linker_version as u64,
            opt.minor_linker_version as u64,
            opt.size_of_code as u64,
            opt.size_of_initialized_data as u64,
            opt.size_of_uninitialized_data as u64,
            opt.address_of_entry_point as u64,
            opt.base_of_code as u64,
            opt.major_operating_system_version as u64,
            opt.minor_operating_system_version as u64,
            opt.major_image_version as u64,
            opt.minor_image_version as u64,
            opt.check_sum as u64,
            opt.major_subsystem_version as u64,
            opt.minor_subsystem_version as u64,
            opt.subsystem as u64,
            opt.size_of_stack_reserve,
            opt.size_of_stack_commit,
            opt.size_of_heap_reserve,
            opt.size_of_heap_commit,
        ];

        Self { values, label }
    }

    /// Value of a named feature column
    pub fn get(&self, column: &str) -> Option<u64> {
        column_index(column).map(|i| self.values[i])
    }

    /// `(column, value)` pairs in schema order
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        FEATURE_COLUMNS.iter().copied().zip(self.values.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PeImageBuilder;
    use std::collections::HashSet;

    #[test]
    fn test_schema_is_unique() {
        let unique: HashSet<_> = FEATURE_COLUMNS.iter().collect();
        assert_eq!(unique.len(), FEATURE_COUNT);
        assert!(!FEATURE_COLUMNS.contains(&LABEL_COLUMN));
    }

    #[test]
    fn test_record_from_headers() {
        let image = PeImageBuilder::pe32()
            .sections(7)
            .linker(9, 2)
            .subsystem(3)
            .build();
        let headers = PeHeaders::parse(&image).unwrap();
        let record = FeatureRecord::from_headers(&headers, Label::Malware);

        assert_eq!(record.get("NumberOfSections"), Some(7));
        assert_eq!(record.get("MajorLinkerVersion"), Some(9));
        assert_eq!(record.get("MinorLinkerVersion"), Some(2));
        assert_eq!(record.get("Subsystem"), Some(3));
        assert_eq!(record.get("e_lfanew"), Some(0x80));
        assert_eq!(record.get("BaseOfData"), None);
        assert_eq!(record.columns().count(), FEATURE_COUNT);
    }

    #[test]
    fn test_optional_header_columns_pe32_plus() {
        let image = PeImageBuilder::pe32_plus()
            .size_of_code(0x1_2000)
            .entry_point(0x1_1a40)
            .check_sum(0x0003_c0de)
            .stack(0x1_0000_0000, 0x2000)
            .heap(0x20_0000, 0x1000)
            .build();
        let headers = PeHeaders::parse(&image).unwrap();
        let record = FeatureRecord::from_headers(&headers, Label::Benign);

        assert_eq!(record.get("SizeOfCode"), Some(0x1_2000));
        assert_eq!(record.get("AddressOfEntryPoint"), Some(0x1_1a40));
        assert_eq!(record.get("CheckSum"), Some(0x0003_c0de));
        assert_eq!(record.get("SizeOfStackReserve"), Some(0x1_0000_0000));
        assert_eq!(record.get("SizeOfStackCommit"), Some(0x2000));
        assert_eq!(record.get("SizeOfHeapReserve"), Some(0x20_0000));
        assert_eq!(record.get("SizeOfHeapCommit"), Some(0x1000));
        assert_eq!(record.label, Label::Benign);
    }
}
