//! Header-only PE parser
//!
//! Reads the DOS header, the `PE\0\0` signature, the COFF file header and
//! the optional header. Section and import tables are never walked, so
//! parsing cost is independent of the image size.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of the IMAGE_DOS_HEADER structure
pub const DOS_HEADER_SIZE: usize = 64;
/// Size of the COFF IMAGE_FILE_HEADER structure
pub const FILE_HEADER_SIZE: usize = 20;
/// Bytes of the PE32 optional header needed for feature extraction
pub const PE32_OPTIONAL_SIZE: usize = 96;
/// Bytes of the PE32+ optional header needed for feature extraction
pub const PE32_PLUS_OPTIONAL_SIZE: usize = 112;

const DOS_MAGIC: &[u8; 2] = b"MZ";
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;

/// Header parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeError {
    #[error("file too small for a DOS header ({0} bytes)")]
    TooSmall(usize),

    #[error("missing MZ signature")]
    BadDosMagic,

    #[error("e_lfanew {0:#x} points outside the file")]
    LfanewOutOfRange(u32),

    #[error("missing PE\\0\\0 signature")]
    BadPeSignature,

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("unknown optional header magic {0:#x}")]
    UnknownOptionalMagic(u16),
}

/// Fields of IMAGE_DOS_HEADER used as features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DosHeader {
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_cparhdr: u16,
    pub e_maxalloc: u16,
    pub e_sp: u16,
    pub e_lfanew: u32,
}

/// Fields of the COFF file header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

/// Optional header flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageKind {
    Pe32,
    Pe32Plus,
}

/// Fields of the optional header, widened to the PE32+ sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalHeader {
    pub kind: ImageKind,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub check_sum: u32,
    pub subsystem: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
}

/// Parsed PE headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeHeaders {
    pub dos: DosHeader,
    pub file: FileHeader,
    pub optional: OptionalHeader,
}

/// Little-endian reads over a byte slice; `None` past the end
struct LeBytes<'a>(&'a [u8]);

impl LeBytes<'_> {
    fn u8_at(&self, off: usize) -> Option<u8> {
        self.0.get(off).copied()
    }

    fn u16_at(&self, off: usize) -> Option<u16> {
        let b = self.0.get(off..off + 2)?;
        Some(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_at(&self, off: usize) -> Option<u32> {
        let b = self.0.get(off..off + 4)?;
        Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64_at(&self, off: usize) -> Option<u64> {
        let b = self.0.get(off..off + 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Some(u64::from_le_bytes(buf))
    }
}

impl PeHeaders {
    /// Number of leading bytes required to parse the headers of an image whose
    /// DOS header reports `e_lfanew`. Used to bound how much of a file is read.
    pub fn required_len(e_lfanew: u32) -> usize {
        e_lfanew as usize + PE_SIGNATURE.len() + FILE_HEADER_SIZE + PE32_PLUS_OPTIONAL_SIZE
    }

    /// Read `e_lfanew` from a DOS header prefix
    pub fn peek_lfanew(prefix: &[u8]) -> Result<u32, PeError> {
        if prefix.len() < DOS_HEADER_SIZE {
            return Err(PeError::TooSmall(prefix.len()));
        }
        if &prefix[0..2] != DOS_MAGIC {
            return Err(PeError::BadDosMagic);
        }
        LeBytes(prefix)
            .u32_at(60)
            .ok_or(PeError::Truncated("DOS header"))
    }

    /// Parse headers from the start of a PE image
    pub fn parse(data: &[u8]) -> Result<Self, PeError> {
        let e_lfanew = Self::peek_lfanew(data)?;
        let bytes = LeBytes(data);

        let dos = DosHeader {
            e_cblp: bytes.u16_at(2).ok_or(PeError::Truncated("DOS header"))?,
            e_cp: bytes.u16_at(4).ok_or(PeError::Truncated("DOS header"))?,
            e_cparhdr: bytes.u16_at(8).ok_or(PeError::Truncated("DOS header"))?,
            e_maxalloc: bytes.u16_at(12).ok_or(PeError::Truncated("DOS header"))?,
            e_sp: bytes.u16_at(16).ok_or(PeError::Truncated("DOS header"))?,
            e_lfanew,
        };

        let pe_offset = e_lfanew as usize;
        let signature = data
            .get(pe_offset..pe_offset + PE_SIGNATURE.len())
            .ok_or(PeError::LfanewOutOfRange(e_lfanew))?;
        if signature != PE_SIGNATURE {
            return Err(PeError::BadPeSignature);
        }

        let fh = pe_offset + PE_SIGNATURE.len();
        let truncated_fh = || PeError::Truncated("file header");
        let file = FileHeader {
            machine: bytes.u16_at(fh).ok_or_else(truncated_fh)?,
            number_of_sections: bytes.u16_at(fh + 2).ok_or_else(truncated_fh)?,
            size_of_optional_header: bytes.u16_at(fh + 16).ok_or_else(truncated_fh)?,
            characteristics: bytes.u16_at(fh + 18).ok_or_else(truncated_fh)?,
        };

        let optional = parse_optional(&bytes, fh + FILE_HEADER_SIZE)?;

        Ok(Self {
            dos,
            file,
            optional,
        })
    }
}

fn parse_optional(bytes: &LeBytes<'_>, oh: usize) -> Result<OptionalHeader, PeError> {
    let truncated = || PeError::Truncated("optional header");

    let magic = bytes.u16_at(oh).ok_or_else(truncated)?;
    let kind = match magic {
        PE32_MAGIC => ImageKind::Pe32,
        PE32_PLUS_MAGIC => ImageKind::Pe32Plus,
        other => return Err(PeError::UnknownOptionalMagic(other)),
    };

    let needed = match kind {
        ImageKind::Pe32 => PE32_OPTIONAL_SIZE,
        ImageKind::Pe32Plus => PE32_PLUS_OPTIONAL_SIZE,
    };
    if bytes.0.len() < oh + needed {
        return Err(truncated());
    }

    // Stack/heap sizes are 32-bit in PE32 and 64-bit in PE32+
    let (stack_reserve, stack_commit, heap_reserve, heap_commit) = match kind {
        ImageKind::Pe32 => (
            bytes.u32_at(oh + 72).map(u64::from),
            bytes.u32_at(oh + 76).map(u64::from),
            bytes.u32_at(oh + 80).map(u64::from),
            bytes.u32_at(oh + 84).map(u64::from),
        ),
        ImageKind::Pe32Plus => (
            bytes.u64_at(oh + 72),
            bytes.u64_at(oh + 80),
            bytes.u64_at(oh + 88),
            bytes.u64_at(oh + 96),
        ),
    };

    Ok(OptionalHeader {
        kind,
        major_linker_version: bytes.u8_at(oh + 2).ok_or_else(truncated)?,
        minor_linker_version: bytes.u8_at(oh + 3).ok_or_else(truncated)?,
        size_of_code: bytes.u32_at(oh + 4).ok_or_else(truncated)?,
        size_of_initialized_data: bytes.u32_at(oh + 8).ok_or_else(truncated)?,
        size_of_uninitialized_data: bytes.u32_at(oh + 12).ok_or_else(truncated)?,
        address_of_entry_point: bytes.u32_at(oh + 16).ok_or_else(truncated)?,
        base_of_code: bytes.u32_at(oh + 20).ok_or_else(truncated)?,
        major_operating_system_version: bytes.u16_at(oh + 40).ok_or_else(truncated)?,
        minor_operating_system_version: bytes.u16_at(oh + 42).ok_or_else(truncated)?,
        major_image_version: bytes.u16_at(oh + 44).ok_or_else(truncated)?,
        minor_image_version: bytes.u16_at(oh + 46).ok_or_else(truncated)?,
        major_subsystem_version: bytes.u16_at(oh + 48).ok_or_else(truncated)?,
        minor_subsystem_version: bytes.u16_at(oh + 50).ok_or_else(truncated)?,
        check_sum: bytes.u32_at(oh + 64).ok_or_else(truncated)?,
        subsystem: bytes.u16_at(oh + 68).ok_or_else(truncated)?,
        size_of_stack_reserve: stack_reserve.ok_or_else(truncated)?,
        size_of_stack_commit: stack_commit.ok_or_else(truncated)?,
        size_of_heap_reserve: heap_reserve.ok_or_else(truncated)?,
        size_of_heap_commit: heap_commit.ok_or_else(truncated)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::PeImageBuilder;

    #[test]
    fn test_parse_pe32() {
        let image = PeImageBuilder::pe32()
            .sections(5)
            .entry_point(0x1234)
            .stack(0x10_0000, 0x1000)
            .build();

        let headers = PeHeaders::parse(&image).unwrap();
        assert_eq!(headers.dos.e_lfanew, 0x80);
        assert_eq!(headers.file.number_of_sections, 5);
        assert_eq!(headers.optional.kind, ImageKind::Pe32);
        assert_eq!(headers.optional.address_of_entry_point, 0x1234);
        assert_eq!(headers.optional.size_of_stack_reserve, 0x10_0000);
        assert_eq!(headers.optional.size_of_stack_commit, 0x1000);
    }

    #[test]
    fn test_parse_pe32_plus_wide_stack() {
        let image = PeImageBuilder::pe32_plus()
            .stack(0x1_0000_0000, 0x2000)
            .build();

        let headers = PeHeaders::parse(&image).unwrap();
        assert_eq!(headers.optional.kind, ImageKind::Pe32Plus);
        assert_eq!(headers.optional.size_of_stack_reserve, 0x1_0000_0000);
        assert_eq!(headers.optional.size_of_stack_commit, 0x2000);
    }

    #[test]
    fn test_rejects_non_pe() {
        assert_eq!(PeHeaders::parse(b"MZ"), Err(PeError::TooSmall(2)));

        let text = vec![b'#'; 256];
        assert_eq!(PeHeaders::parse(&text), Err(PeError::BadDosMagic));
    }

    #[test]
    fn test_rejects_bad_signature_and_offset() {
        let mut image = PeImageBuilder::pe32().build();
        image[0x80] = b'N';
        assert_eq!(PeHeaders::parse(&image), Err(PeError::BadPeSignature));

        let mut image = PeImageBuilder::pe32().build();
        image[60..64].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());
        assert_eq!(
            PeHeaders::parse(&image),
            Err(PeError::LfanewOutOfRange(0xFFFF_0000))
        );
    }

    #[test]
    fn test_rejects_truncated_optional_header() {
        let image = PeImageBuilder::pe32().build();
        let cut = &image[..0x80 + 4 + FILE_HEADER_SIZE + 40];
        assert_eq!(
            PeHeaders::parse(cut),
            Err(PeError::Truncated("optional header"))
        );
    }

    #[test]
    fn test_rejects_unknown_magic() {
        let mut image = PeImageBuilder::pe32().build();
        let oh = 0x80 + 4 + FILE_HEADER_SIZE;
        image[oh..oh + 2].copy_from_slice(&0x107u16.to_le_bytes());
        assert_eq!(
            PeHeaders::parse(&image),
            Err(PeError::UnknownOptionalMagic(0x107))
        );
    }
}
